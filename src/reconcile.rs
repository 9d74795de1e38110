use crate::config::Config;
use crate::error::ConfigError;

/// How the evaluation environment renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Interactive on-screen window.
    Human,
    /// Off-screen frames returned as arrays, for video recording.
    RgbArray,
}

/// Evaluation-time configuration derived from a loaded experiment config.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub config: Config,
    pub render_action_repeat: u32,
    /// `None` disables rendering.
    pub render_mode: Option<RenderMode>,
}

/// Derive the evaluation configuration: frameskip, single env, render mode.
///
/// Fails before anything is built when `env_frameskip` is not a multiple of
/// the evaluation frameskip.
pub fn reconcile(mut config: Config) -> Result<Reconciled, ConfigError> {
    let eval_env_frameskip = config.eval_env_frameskip.unwrap_or(config.env_frameskip);
    if eval_env_frameskip == 0 || config.env_frameskip % eval_env_frameskip != 0 {
        return Err(ConfigError::FrameskipNotDivisible {
            env_frameskip: config.env_frameskip,
            eval_env_frameskip,
        });
    }
    let render_action_repeat = config.env_frameskip / eval_env_frameskip;
    config.env_frameskip = eval_env_frameskip;
    config.eval_env_frameskip = Some(eval_env_frameskip);
    tracing::debug!(
        frameskip = config.env_frameskip,
        render_action_repeat,
        "using evaluation frameskip"
    );

    config.num_envs = 1;

    let render_mode = if config.save_video {
        Some(RenderMode::RgbArray)
    } else if config.no_render {
        None
    } else {
        Some(RenderMode::Human)
    };

    Ok(Reconciled {
        config,
        render_action_repeat,
        render_mode,
    })
}
