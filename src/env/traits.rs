//! Environment interfaces consumed by the export pipeline.

use crate::config::Config;
use crate::error::EnvError;
use crate::reconcile::RenderMode;

/// Shape description of an observation or action space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Space {
    /// Continuous values with the given shape.
    Box { shape: Vec<usize> },
    /// One of `n` discrete choices.
    Discrete { n: usize },
}

impl Space {
    /// Width of a flat box space.
    pub fn flat_width(&self) -> Option<usize> {
        match self {
            Space::Box { shape } if shape.len() == 1 => Some(shape[0]),
            _ => None,
        }
    }
}

/// Identifies one environment instance among the workers of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvContext {
    pub worker_index: usize,
    pub vector_index: usize,
    pub env_id: usize,
    /// How many times each action is repeated while rendering.
    pub render_action_repeat: u32,
}

/// Environments that reset themselves on construction unless told otherwise.
///
/// The reset would corrupt a demonstration recorded right after construction.
pub trait ResetOnInit {
    fn reset_on_init(&self) -> bool;
    fn set_reset_on_init(&mut self, enabled: bool);
}

/// An environment as seen by the export pipeline: spaces and capabilities only.
pub trait Environment {
    fn observation_space(&self) -> &Space;
    fn action_space(&self) -> &Space;
    fn render_mode(&self) -> Option<RenderMode>;

    /// The reset-on-init control, if this environment has one.
    fn reset_on_init_control(&mut self) -> Option<&mut dyn ResetOnInit> {
        None
    }
}

/// Builds environments from configuration.
pub trait EnvFactory {
    fn make_env(
        &self,
        config: &Config,
        ctx: &EnvContext,
        render_mode: Option<RenderMode>,
    ) -> Result<Box<dyn Environment>, EnvError>;
}

/// Metadata derived from a constructed environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvInfo {
    pub obs_space: Space,
    pub action_space: Space,
    pub num_agents: usize,
    pub frameskip: u32,
    pub render_action_repeat: u32,
}

pub fn extract_env_info(env: &dyn Environment, config: &Config, ctx: &EnvContext) -> EnvInfo {
    EnvInfo {
        obs_space: env.observation_space().clone(),
        action_space: env.action_space().clone(),
        num_agents: 1,
        frameskip: config.env_frameskip,
        render_action_repeat: ctx.render_action_repeat,
    }
}
