use std::fs;
use std::path::{Path, PathBuf};

use crate::checkpoint::payload::CheckpointPayload;
use crate::config::{CheckpointKind, Config};
use crate::error::CheckpointError;
use crate::fs::{write_atomic, TMP_SUFFIX};

/// Extension of checkpoint files.
pub const CHECKPOINT_EXT: &str = "mpk";

/// File name for a checkpoint. Step counts are zero-padded so that
/// lexicographic order is chronological.
pub fn checkpoint_file_name(kind: CheckpointKind, train_step: u64, env_steps: u64) -> String {
    format!(
        "{}_{:09}_{}.{}",
        kind.name_prefix(),
        train_step,
        env_steps,
        CHECKPOINT_EXT
    )
}

/// Locates, loads and writes policy checkpoints of one experiment.
///
/// Layout: `<train_dir>/<experiment>/checkpoint_p<policy>/{checkpoint,best}_*`.
pub struct CheckpointStore {
    experiment_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(experiment_dir: impl Into<PathBuf>) -> Self {
        CheckpointStore {
            experiment_dir: experiment_dir.into(),
        }
    }

    pub fn for_experiment(config: &Config) -> Self {
        Self::new(config.experiment_dir())
    }

    /// Directory holding the checkpoints of one policy.
    pub fn policy_dir(&self, policy_index: usize) -> PathBuf {
        self.experiment_dir
            .join(format!("checkpoint_p{policy_index}"))
    }

    /// Checkpoint files of `kind` in `policy_dir`, oldest first.
    pub fn resolve(
        &self,
        policy_dir: &Path,
        kind: CheckpointKind,
    ) -> Result<Vec<PathBuf>, CheckpointError> {
        if !policy_dir.is_dir() {
            return Err(CheckpointError::DirNotFound(policy_dir.to_path_buf()));
        }
        let prefix = format!("{}_", kind.name_prefix());
        let mut candidates = Vec::new();
        for entry in fs::read_dir(policy_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if !name_str.starts_with(&prefix) || name_str.ends_with(TMP_SUFFIX) {
                continue;
            }
            candidates.push(path);
        }
        if candidates.is_empty() {
            return Err(CheckpointError::NotFound {
                dir: policy_dir.to_path_buf(),
                pattern: format!("{prefix}*"),
            });
        }
        candidates.sort();
        Ok(candidates)
    }

    /// Load the most recent of the resolved candidates.
    pub fn load(&self, candidates: &[PathBuf]) -> Result<CheckpointPayload, CheckpointError> {
        let path = candidates.last().ok_or_else(|| CheckpointError::NotFound {
            dir: self.experiment_dir.clone(),
            pattern: "*".to_string(),
        })?;
        tracing::info!(path = %path.display(), "loading state from checkpoint");
        let bytes = fs::read(path).map_err(|e| CheckpointError::Read {
            path: path.clone(),
            source: e,
        })?;
        rmp_serde::from_slice(&bytes).map_err(|e| CheckpointError::Decode {
            path: path.clone(),
            source: e,
        })
    }

    /// Resolve and load in one step.
    pub fn load_policy(
        &self,
        policy_index: usize,
        kind: CheckpointKind,
    ) -> Result<CheckpointPayload, CheckpointError> {
        let candidates = self.resolve(&self.policy_dir(policy_index), kind)?;
        self.load(&candidates)
    }

    /// Write a checkpoint for `policy_index` and return its path.
    pub fn save(
        &self,
        policy_index: usize,
        kind: CheckpointKind,
        payload: &CheckpointPayload,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.policy_dir(policy_index).join(checkpoint_file_name(
            kind,
            payload.train_step,
            payload.env_steps,
        ));
        let bytes = rmp_serde::to_vec_named(payload)?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }
}
