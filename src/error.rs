use std::path::PathBuf;

/// Errors that can occur when loading or reconciling configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to parse saved config {path}: {source}")]
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    JsonWrite(serde_json::Error),

    #[error("no saved config for experiment at {0}")]
    SavedConfigMissing(PathBuf),

    #[error("env_frameskip={env_frameskip} must be divisible by eval_env_frameskip={eval_env_frameskip}")]
    FrameskipNotDivisible {
        env_frameskip: u32,
        eval_env_frameskip: u32,
    },

    #[error("unknown checkpoint kind '{0}' (expected 'latest' or 'best')")]
    UnknownCheckpointKind(String),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// Errors that can occur while building an environment.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("unknown environment '{0}'")]
    UnknownEnv(String),

    #[error("failed to construct environment '{env}': {reason}")]
    Construction { env: String, reason: String },
}

/// Errors that can occur while building a policy network.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unsupported observation space: {0}")]
    UnsupportedObservationSpace(String),

    #[error("unsupported action space: {0}")]
    UnsupportedActionSpace(String),
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint directory not found: {0}")]
    DirNotFound(PathBuf),

    #[error("no checkpoint matching '{pattern}' in {dir}")]
    NotFound { dir: PathBuf, pattern: String },

    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode checkpoint {path}: {source}")]
    Decode {
        path: PathBuf,
        source: rmp_serde::decode::Error,
    },

    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("checkpoint is missing parameter '{0}'")]
    MissingKey(String),

    #[error("checkpoint has unexpected parameter '{0}'")]
    UnexpectedKey(String),

    #[error("shape mismatch for '{key}': network expects {expected:?}, checkpoint has {found:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("parameter '{key}' has {len} values but shape {shape:?}")]
    BadLength {
        key: String,
        shape: Vec<usize>,
        len: usize,
    },

    #[error("failed to read tensor data: {0}")]
    TensorData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while tracing, persisting or replaying a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("shape mismatch in {op}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: [usize; 2],
        found: [usize; 2],
    },

    #[error("graph expects {expected} inputs, got {found}")]
    InputCount { expected: usize, found: usize },

    #[error("failed to read tensor data: {0}")]
    TensorData(String),

    #[error("malformed graph: {0}")]
    Malformed(String),

    #[error("unsupported graph format version {found} (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u32 },

    #[error("failed to encode graph: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode graph {path}: {source}")]
    Decode {
        path: PathBuf,
        source: rmp_serde::decode::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort an export run.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("environment error: {0}")]
    Env(#[from] EnvError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("trace error: {0}")]
    Graph(#[from] GraphError),

    #[error("traced output '{0}' is missing")]
    MissingOutput(String),

    #[error("traced output '{output}' differs from live network by {max_abs_diff} (tolerance {tolerance})")]
    TraceMismatch {
        output: String,
        max_abs_diff: f32,
        tolerance: f32,
    },
}
