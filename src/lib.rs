//! # Policy Export
//!
//! Turns a trained actor-critic checkpoint into a self-contained traced
//! inference graph. The experiment's saved configuration is reconciled for
//! evaluation, the policy is rebuilt from the environment's spaces and
//! restored from the selected checkpoint, and its forward pass is captured by
//! symbolic execution. The artifact is reloaded and verified against the live
//! network before the run completes. Built on the Burn ML framework.
//!
//! ## Modules
//!
//! - [`export`] — End-to-end pipeline and its report
//! - [`config`] — TOML / saved JSON configuration, overrides and validation
//! - [`reconcile`] — Evaluation frameskip, env count and render mode
//! - [`env`] — Environment traits, registry and env metadata
//! - [`model`] — Actor-critic network, GRU core, executor abstraction
//! - [`checkpoint`] — Checkpoint naming, discovery, loading and saving
//! - [`trace`] — Graph capture, artifact format and replay
//! - [`device`] — CPU / accelerator device selection per backend
//! - [`memory`] — Process and accelerator memory diagnostics
//! - [`fs`] — Atomic file writes
//! - [`error`] — Structured error types

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod device;
pub mod env;
pub mod error;
pub mod export;
pub mod fs;
pub mod memory;
pub mod model;
pub mod reconcile;
pub mod trace;
