use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A host-side tensor: row-major `data` with the given `shape`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Parameter name → tensor.
pub type StateDict = BTreeMap<String, TensorRecord>;

/// Contents of a checkpoint file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub train_step: u64,
    pub env_steps: u64,
    pub model: StateDict,
}
