//! Process and accelerator memory readings for diagnostics.

use std::collections::BTreeMap;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use crate::device::DeviceKind;

const BYTES_PER_MB: f64 = 1e6;

/// Labelled memory readings in megabytes.
pub type MemoryStats = BTreeMap<String, f64>;

/// Source of accelerator memory counters.
pub trait AcceleratorMemory {
    /// Bytes currently allocated by this process.
    fn allocated_bytes(&self) -> u64;
    /// Bytes currently reserved on the device. Sources without a per-process
    /// reservation (NVML) report device-wide usage, which includes other processes.
    fn reserved_bytes(&self) -> u64;
}

/// Reports resident process memory and, for accelerator devices, accelerator memory.
pub struct MemoryReporter {
    accelerator: Option<Box<dyn AcceleratorMemory>>,
}

impl Default for MemoryReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReporter {
    /// Reporter using NVML for accelerator counters when the `nvml` feature is
    /// enabled and a driver is present.
    pub fn new() -> Self {
        #[cfg(feature = "nvml")]
        let accelerator = nvml::NvmlMemory::init()
            .map(|m| Box::new(m) as Box<dyn AcceleratorMemory>);
        #[cfg(not(feature = "nvml"))]
        let accelerator = None;

        MemoryReporter { accelerator }
    }

    pub fn with_accelerator(accelerator: Box<dyn AcceleratorMemory>) -> Self {
        MemoryReporter {
            accelerator: Some(accelerator),
        }
    }

    pub fn report(&self, process: &str, device: DeviceKind) -> MemoryStats {
        let mut stats = MemoryStats::new();
        stats.insert(format!("memory_{process}"), process_memory_mb());

        if !device.is_cpu() {
            let (allocated, reserved) = self
                .accelerator
                .as_ref()
                .map(|a| (a.allocated_bytes(), a.reserved_bytes()))
                .unwrap_or((0, 0));
            stats.insert(format!("gpu_mem_{process}"), allocated as f64 / BYTES_PER_MB);
            stats.insert(format!("gpu_cache_{process}"), reserved as f64 / BYTES_PER_MB);
        }
        stats
    }
}

/// Resident memory of the current process, 0 when it cannot be read.
pub fn process_memory_mb() -> f64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0.0;
    };
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::new().with_memory(),
    );
    sys.process(pid)
        .map(|p| p.memory() as f64 / BYTES_PER_MB)
        .unwrap_or(0.0)
}

#[cfg(feature = "nvml")]
mod nvml {
    use nvml_wrapper::enums::device::UsedGpuMemory;
    use nvml_wrapper::Nvml;

    use super::AcceleratorMemory;

    pub struct NvmlMemory {
        nvml: Nvml,
        index: u32,
    }

    impl NvmlMemory {
        pub fn init() -> Option<Self> {
            let nvml = Nvml::init().ok()?;
            nvml.device_by_index(0).ok()?;
            Some(NvmlMemory { nvml, index: 0 })
        }
    }

    impl AcceleratorMemory for NvmlMemory {
        fn allocated_bytes(&self) -> u64 {
            let pid = std::process::id();
            let Ok(device) = self.nvml.device_by_index(self.index) else {
                return 0;
            };
            device
                .running_compute_processes()
                .unwrap_or_default()
                .into_iter()
                .filter(|p| p.pid == pid)
                .map(|p| match p.used_gpu_memory {
                    UsedGpuMemory::Used(bytes) => bytes,
                    UsedGpuMemory::Unavailable => 0,
                })
                .sum()
        }

        /// Device-wide used memory; NVML has no per-process reservation counter.
        fn reserved_bytes(&self) -> u64 {
            self.nvml
                .device_by_index(self.index)
                .and_then(|d| d.memory_info())
                .map(|m| m.used)
                .unwrap_or(0)
        }
    }
}
