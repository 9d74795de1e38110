use std::collections::HashMap;

use crate::config::Config;
use crate::env::traits::{EnvContext, EnvFactory, Environment, ResetOnInit, Space};
use crate::error::EnvError;
use crate::reconcile::RenderMode;

type EnvConstructor = Box<
    dyn Fn(&Config, &EnvContext, Option<RenderMode>) -> Result<Box<dyn Environment>, EnvError>,
>;

/// Environment that only declares its spaces. Enough to rebuild a policy.
#[derive(Debug, Clone)]
pub struct DeclaredEnv {
    obs_space: Space,
    action_space: Space,
    render_mode: Option<RenderMode>,
    reset_on_init: Option<bool>,
}

impl DeclaredEnv {
    pub fn new(obs_space: Space, action_space: Space, render_mode: Option<RenderMode>) -> Self {
        DeclaredEnv {
            obs_space,
            action_space,
            render_mode,
            reset_on_init: None,
        }
    }

    /// Give this environment a reset-on-init control, initially `enabled`.
    pub fn with_reset_on_init(mut self, enabled: bool) -> Self {
        self.reset_on_init = Some(enabled);
        self
    }
}

impl Environment for DeclaredEnv {
    fn observation_space(&self) -> &Space {
        &self.obs_space
    }

    fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn render_mode(&self) -> Option<RenderMode> {
        self.render_mode
    }

    fn reset_on_init_control(&mut self) -> Option<&mut dyn ResetOnInit> {
        if self.reset_on_init.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl ResetOnInit for DeclaredEnv {
    fn reset_on_init(&self) -> bool {
        self.reset_on_init.unwrap_or(false)
    }

    fn set_reset_on_init(&mut self, enabled: bool) {
        self.reset_on_init = Some(enabled);
    }
}

/// Name → constructor table of known environments.
pub struct EnvRegistry {
    entries: HashMap<String, EnvConstructor>,
}

impl Default for EnvRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl EnvRegistry {
    pub fn empty() -> Self {
        EnvRegistry {
            entries: HashMap::new(),
        }
    }

    /// Registry with the built-in classic-control descriptors.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register_declared("cartpole", 4, 2);
        registry.register_declared("lunar_lander", 8, 4);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&Config, &EnvContext, Option<RenderMode>) -> Result<Box<dyn Environment>, EnvError>
            + 'static,
    {
        self.entries.insert(name.into(), Box::new(constructor));
    }

    /// Register a space-only environment with a flat observation and discrete actions.
    pub fn register_declared(&mut self, name: &str, obs_width: usize, num_actions: usize) {
        self.register(name, move |_, _, render_mode| {
            Ok(Box::new(DeclaredEnv::new(
                Space::Box {
                    shape: vec![obs_width],
                },
                Space::Discrete { n: num_actions },
                render_mode,
            )) as Box<dyn Environment>)
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl EnvFactory for EnvRegistry {
    fn make_env(
        &self,
        config: &Config,
        ctx: &EnvContext,
        render_mode: Option<RenderMode>,
    ) -> Result<Box<dyn Environment>, EnvError> {
        let constructor = self
            .entries
            .get(&config.env)
            .ok_or_else(|| EnvError::UnknownEnv(config.env.clone()))?;
        tracing::debug!(
            env = %config.env,
            worker = ctx.worker_index,
            vector = ctx.vector_index,
            env_id = ctx.env_id,
            "making environment"
        );
        constructor(config, ctx, render_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::traits::extract_env_info;

    #[test]
    fn test_builtin_lunar_lander_spaces() {
        let registry = EnvRegistry::with_builtin();
        let config = Config {
            env: "lunar_lander".into(),
            ..Config::default()
        };
        let ctx = EnvContext::default();
        let env = registry
            .make_env(&config, &ctx, Some(RenderMode::RgbArray))
            .unwrap();
        assert_eq!(env.observation_space().flat_width(), Some(8));
        assert_eq!(env.action_space(), &Space::Discrete { n: 4 });
        assert_eq!(env.render_mode(), Some(RenderMode::RgbArray));

        let info = extract_env_info(env.as_ref(), &config, &ctx);
        assert_eq!(info.num_agents, 1);
        assert_eq!(info.frameskip, config.env_frameskip);
    }

    #[test]
    fn test_unknown_env_is_fatal() {
        let registry = EnvRegistry::with_builtin();
        let config = Config {
            env: "doom_battle".into(),
            ..Config::default()
        };
        let err = registry
            .make_env(&config, &EnvContext::default(), None)
            .err()
            .unwrap();
        assert!(matches!(err, EnvError::UnknownEnv(ref name) if name == "doom_battle"));
    }

    #[test]
    fn test_reset_on_init_capability() {
        let mut plain = DeclaredEnv::new(
            Space::Box { shape: vec![4] },
            Space::Discrete { n: 2 },
            None,
        );
        assert!(plain.reset_on_init_control().is_none());

        let mut quirky = plain.clone().with_reset_on_init(true);
        let control = quirky.reset_on_init_control().unwrap();
        assert!(control.reset_on_init());
        control.set_reset_on_init(false);
        assert!(!quirky.reset_on_init());
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = EnvRegistry::empty();
        registry.register("quirky", |_, _, render_mode| {
            Ok(Box::new(
                DeclaredEnv::new(Space::Box { shape: vec![3] }, Space::Discrete { n: 5 }, render_mode)
                    .with_reset_on_init(true),
            ) as Box<dyn Environment>)
        });
        assert!(registry.contains("quirky"));
        assert!(!registry.contains("cartpole"));
    }
}
