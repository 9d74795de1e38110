use std::fmt;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::wgpu::WgpuDevice;
use burn::backend::{NdArray, Wgpu};
use burn::prelude::*;

/// Binary CPU / accelerator placement selected by the `device` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Accelerator,
}

impl DeviceKind {
    /// `"cpu"` selects the CPU; any other value selects the accelerator.
    pub fn from_config(device: &str) -> Self {
        if device == "cpu" {
            DeviceKind::Cpu
        } else {
            DeviceKind::Accelerator
        }
    }

    pub fn is_cpu(self) -> bool {
        self == DeviceKind::Cpu
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Backends that can map a [`DeviceKind`] onto one of their devices.
pub trait DeviceSelect: Backend {
    fn select_device(kind: DeviceKind) -> Self::Device;
}

impl DeviceSelect for Wgpu<f32, i32> {
    fn select_device(kind: DeviceKind) -> Self::Device {
        match kind {
            DeviceKind::Cpu => WgpuDevice::Cpu,
            DeviceKind::Accelerator => WgpuDevice::DefaultDevice,
        }
    }
}

impl DeviceSelect for NdArray<f32> {
    fn select_device(kind: DeviceKind) -> Self::Device {
        if !kind.is_cpu() {
            tracing::warn!("ndarray backend has no accelerator, placing policy on cpu");
        }
        NdArrayDevice::Cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_from_config() {
        assert_eq!(DeviceKind::from_config("cpu"), DeviceKind::Cpu);
        assert_eq!(DeviceKind::from_config("gpu"), DeviceKind::Accelerator);
        assert_eq!(DeviceKind::from_config("cuda"), DeviceKind::Accelerator);
    }

    #[test]
    fn test_wgpu_device_selection() {
        assert_eq!(
            <Wgpu<f32, i32> as DeviceSelect>::select_device(DeviceKind::Cpu),
            WgpuDevice::Cpu
        );
        assert_eq!(
            <Wgpu<f32, i32> as DeviceSelect>::select_device(DeviceKind::Accelerator),
            WgpuDevice::DefaultDevice
        );
    }

    #[test]
    fn test_ndarray_always_cpu() {
        assert_eq!(
            <NdArray<f32> as DeviceSelect>::select_device(DeviceKind::Accelerator),
            NdArrayDevice::Cpu
        );
    }
}
