//! End-to-end export: saved experiment → restored policy → traced artifact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use burn::backend::{Autodiff, NdArray, Wgpu};
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::checkpoint::CheckpointStore;
use crate::config::{Config, ConfigOverrides};
use crate::device::{DeviceKind, DeviceSelect};
use crate::env::{extract_env_info, EnvContext, EnvFactory};
use crate::error::{ExportError, GraphError};
use crate::fs::staging_path;
use crate::memory::{MemoryReporter, MemoryStats};
use crate::model::{create_actor_critic, ActorCritic, PolicyOutput};
use crate::reconcile::reconcile;
use crate::trace::{trace_policy, TracedGraph, TracedModule};

const SEPARATOR: &str = "-----------------------------";

/// Outcome of a successful export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub artifact_path: PathBuf,
    /// Train step of the restored checkpoint.
    pub train_step: u64,
    pub num_params: usize,
    pub render_action_repeat: u32,
    /// Outputs of the reloaded artifact on the example inputs.
    pub outputs: BTreeMap<String, Vec<f32>>,
    pub memory: MemoryStats,
}

/// Final status of an export run, reported as the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Success,
    Failure,
}

impl ExportStatus {
    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => ExportStatus::Success,
            Err(_) => ExportStatus::Failure,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ExportStatus::Success => 0,
            ExportStatus::Failure => 1,
        }
    }
}

impl From<ExportStatus> for ExitCode {
    fn from(status: ExportStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Rebuilds a trained policy from its experiment directory and writes a traced
/// inference graph of it.
pub struct ExportPipeline<'a> {
    envs: &'a dyn EnvFactory,
    memory: MemoryReporter,
}

impl<'a> ExportPipeline<'a> {
    pub fn new(envs: &'a dyn EnvFactory) -> Self {
        ExportPipeline {
            envs,
            memory: MemoryReporter::new(),
        }
    }

    pub fn with_memory_reporter(mut self, memory: MemoryReporter) -> Self {
        self.memory = memory;
        self
    }

    /// Export the experiment `config` points at, using the configuration saved
    /// by training with `overrides` applied on top.
    pub fn export<B: DeviceSelect>(
        &self,
        config: &Config,
        overrides: &ConfigOverrides,
        obs_width: usize,
        state_width: usize,
    ) -> Result<ExportReport, ExportError> {
        let loaded = config.load_from_checkpoint(overrides)?;
        self.export_loaded::<B>(loaded, obs_width, state_width)
    }

    /// Like [`export`](Self::export), on the backend the loaded `device` key
    /// asks for: ndarray on the CPU, wgpu on an accelerator.
    pub fn export_on_configured_device(
        &self,
        config: &Config,
        overrides: &ConfigOverrides,
        obs_width: usize,
        state_width: usize,
    ) -> Result<ExportReport, ExportError> {
        let loaded = config.load_from_checkpoint(overrides)?;
        match DeviceKind::from_config(&loaded.device) {
            DeviceKind::Cpu => self.export_loaded::<NdArray<f32>>(loaded, obs_width, state_width),
            DeviceKind::Accelerator => {
                self.export_loaded::<Wgpu<f32, i32>>(loaded, obs_width, state_width)
            }
        }
    }

    /// Export with an already loaded experiment configuration.
    pub fn export_loaded<B: DeviceSelect>(
        &self,
        config: Config,
        obs_width: usize,
        state_width: usize,
    ) -> Result<ExportReport, ExportError> {
        let reconciled = reconcile(config)?;
        let config = reconciled.config;

        let ctx = EnvContext {
            worker_index: 0,
            vector_index: 0,
            env_id: 0,
            render_action_repeat: reconciled.render_action_repeat,
        };
        let mut env = self.envs.make_env(&config, &ctx, reconciled.render_mode)?;
        let env_info = extract_env_info(env.as_ref(), &config, &ctx);
        if let Some(control) = env.reset_on_init_control() {
            control.set_reset_on_init(false);
            tracing::debug!("disabled reset on init");
        }

        let policy: ActorCritic<Autodiff<B>> = create_actor_critic(
            &config.model,
            &env_info.obs_space,
            &env_info.action_space,
            &Default::default(),
        )?;
        let device_kind = DeviceKind::from_config(&config.device);
        let device = B::select_device(device_kind);
        let policy: ActorCritic<B> = policy.valid().to_device(&device);

        let store = CheckpointStore::for_experiment(&config);
        let candidates = store.resolve(
            &store.policy_dir(config.policy_index),
            config.load_checkpoint_kind,
        )?;
        let checkpoint = store.load(&candidates)?;
        let policy = policy.load_state_dict(&checkpoint.model, &device)?;
        let num_params = policy.num_params();
        tracing::info!(
            train_step = checkpoint.train_step,
            env_steps = checkpoint.env_steps,
            num_params,
            device = %device_kind,
            "model loaded"
        );

        let obs = example_observation::<B>(obs_width, config.export.seed, &device);
        let rnn_states = Tensor::<B, 2>::zeros([1, state_width], &device);

        let graph = trace_policy(&policy, obs.dims(), rnn_states.dims())?;
        let artifact_path = config.export.artifact_path();
        let tolerance = config.export.verify_tolerance;
        let outputs = publish_verified(&graph, &artifact_path, |staged| {
            let reloaded = TracedModule::<B>::load(staged, &device)?;
            let traced = reloaded.forward(&[obs.clone(), rnn_states.clone()])?;
            let live = policy.forward(obs.clone(), rnn_states.clone());
            compare_outputs(live, &traced, tolerance)
        })?;
        tracing::info!(path = %artifact_path.display(), nodes = graph.nodes.len(), "trace saved");
        println!("{SEPARATOR}");
        println!("{SEPARATOR}");
        println!("Traced model saved to {}", artifact_path.display());
        println!("{SEPARATOR}");
        for (name, values) in &outputs {
            println!("{name}: {values:?}");
        }
        println!("{SEPARATOR}");
        println!("{SEPARATOR}");
        tracing::info!(outputs = outputs.len(), "output produced");

        let memory = self.memory.report("export", device_kind);
        tracing::debug!(?memory, "memory stats");

        Ok(ExportReport {
            artifact_path,
            train_step: checkpoint.train_step,
            num_params,
            render_action_repeat: reconciled.render_action_repeat,
            outputs,
            memory,
        })
    }
}

/// Write `graph` to a staging file, run `verify` on it, and only then move it
/// to `path`. On failure the staging file is removed and `path` is untouched.
fn publish_verified<T>(
    graph: &TracedGraph,
    path: &Path,
    verify: impl FnOnce(&Path) -> Result<T, ExportError>,
) -> Result<T, ExportError> {
    let staged = staging_path(path);
    graph.save(&staged)?;
    let verified = verify(&staged).and_then(|value| {
        std::fs::rename(&staged, path).map_err(GraphError::from)?;
        Ok(value)
    });
    if verified.is_err() {
        if let Err(e) = std::fs::remove_file(&staged) {
            tracing::warn!(path = %staged.display(), error = %e, "failed to remove staged artifact");
        }
    }
    verified
}

/// Host values of every traced output, checked against the live network.
fn compare_outputs<B: Backend>(
    live: PolicyOutput<Tensor<B, 2>>,
    traced: &BTreeMap<String, Tensor<B, 2>>,
    tolerance: f32,
) -> Result<BTreeMap<String, Vec<f32>>, ExportError> {
    let mut outputs = BTreeMap::new();
    for (name, expected) in live.into_named() {
        let actual = traced
            .get(name)
            .ok_or_else(|| ExportError::MissingOutput(name.to_string()))?;
        let actual = host_values(actual.clone())?;
        let expected = host_values(expected)?;
        let diff = max_abs_diff(&actual, &expected);
        if diff > tolerance {
            return Err(ExportError::TraceMismatch {
                output: name.to_string(),
                max_abs_diff: diff,
                tolerance,
            });
        }
        outputs.insert(name.to_string(), actual);
    }
    Ok(outputs)
}

/// A `[1, width]` observation of standard-normal values.
fn example_observation<B: Backend>(
    width: usize,
    seed: Option<u64>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let values: Vec<f32> = (0..width).map(|_| rng.sample(StandardNormal)).collect();
    Tensor::from_data(TensorData::new(values, [1, width]), device)
}

fn host_values<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f32>, ExportError> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| GraphError::TensorData(format!("{e:?}")).into())
}

fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x - y).abs() {
            d if d.is_nan() && x.to_bits() != y.to_bits() => f32::INFINITY,
            d if d.is_nan() => 0.0,
            d => d,
        })
        .fold(0.0, f32::max)
}
