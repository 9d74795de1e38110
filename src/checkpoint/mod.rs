mod payload;
mod store;

pub use payload::{CheckpointPayload, StateDict, TensorRecord};
pub use store::{checkpoint_file_name, CheckpointStore, CHECKPOINT_EXT};
