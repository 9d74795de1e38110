//! Environment construction as seen by the exporter.
//!
//! Simulation lives elsewhere; the exporter only needs an environment's spaces
//! and its optional reset-on-init control.

mod registry;
mod traits;

pub use registry::{DeclaredEnv, EnvRegistry};
pub use traits::{
    extract_env_info, EnvContext, EnvFactory, EnvInfo, Environment, ResetOnInit, Space,
};
