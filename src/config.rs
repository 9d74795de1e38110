use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// File name of the configuration saved next to an experiment's checkpoints.
pub const SAVED_CONFIG_FILE: &str = "config.json";

/// Which checkpoint of a policy to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Latest,
    Best,
}

impl CheckpointKind {
    /// File name prefix used for checkpoints of this kind.
    pub fn name_prefix(self) -> &'static str {
        match self {
            CheckpointKind::Latest => "checkpoint",
            CheckpointKind::Best => "best",
        }
    }
}

impl FromStr for CheckpointKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(CheckpointKind::Latest),
            "best" => Ok(CheckpointKind::Best),
            other => Err(ConfigError::UnknownCheckpointKind(other.to_string())),
        }
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointKind::Latest => write!(f, "latest"),
            CheckpointKind::Best => write!(f, "best"),
        }
    }
}

/// Activation applied after every encoder layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nonlinearity {
    Elu,
    Relu,
    Tanh,
}

/// Policy network architecture.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub encoder_mlp_layers: Vec<usize>,
    pub nonlinearity: Nonlinearity,
    pub use_rnn: bool,
    pub rnn_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            encoder_mlp_layers: vec![512, 512],
            nonlinearity: Nonlinearity::Elu,
            use_rnn: true,
            rnn_size: 512,
        }
    }
}

/// Where and how the traced artifact is produced.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub output_dir: PathBuf,
    pub traced_model_name: String,
    /// Seed for the example observation. Random when unset.
    pub seed: Option<u64>,
    /// Largest accepted difference between live and reloaded outputs.
    pub verify_tolerance: f32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            output_dir: PathBuf::from("."),
            traced_model_name: "traced_policy.mpk".to_string(),
            seed: None,
            verify_tolerance: 1e-5,
        }
    }
}

impl ExportSettings {
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(&self.traced_model_name)
    }
}

/// Experiment configuration, loadable from TOML (operator) or JSON (saved by training).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub train_dir: PathBuf,
    pub experiment: String,
    pub env: String,
    pub env_frameskip: u32,
    pub eval_env_frameskip: Option<u32>,
    pub num_envs: usize,
    pub save_video: bool,
    pub no_render: bool,
    pub policy_index: usize,
    pub load_checkpoint_kind: CheckpointKind,
    pub device: String,
    pub model: ModelConfig,
    pub export: ExportSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            train_dir: PathBuf::from("train_dir"),
            experiment: "default_experiment".to_string(),
            env: "cartpole".to_string(),
            env_frameskip: 1,
            eval_env_frameskip: None,
            num_envs: 2,
            save_video: false,
            no_render: false,
            policy_index: 0,
            load_checkpoint_kind: CheckpointKind::Latest,
            device: "gpu".to_string(),
            model: ModelConfig::default(),
            export: ExportSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn experiment_dir(&self) -> PathBuf {
        self.train_dir.join(&self.experiment)
    }

    /// Write this configuration as the experiment's saved config.
    pub fn save_experiment_config(&self) -> Result<PathBuf, ConfigError> {
        let dir = self.experiment_dir();
        let path = dir.join(SAVED_CONFIG_FILE);
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::JsonWrite)?;
        std::fs::create_dir_all(&dir)
            .and_then(|_| std::fs::write(&path, json))
            .map_err(|e| ConfigError::FileWrite {
                path: path.clone(),
                source: e,
            })?;
        Ok(path)
    }

    /// Load the configuration saved with the experiment this config points at.
    ///
    /// Every saved value is kept unless `overrides` sets it explicitly. Only the
    /// experiment location and the `[export]` settings come from `self`.
    pub fn load_from_checkpoint(&self, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let path = self.experiment_dir().join(SAVED_CONFIG_FILE);
        if !path.exists() {
            return Err(ConfigError::SavedConfigMissing(path));
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let saved: Config = serde_json::from_str(&content)
            .map_err(|e| ConfigError::JsonParse { path: path.clone(), source: e })?;
        tracing::info!(path = %path.display(), "loaded saved experiment config");

        let mut config = Config {
            train_dir: self.train_dir.clone(),
            experiment: self.experiment.clone(),
            export: self.export.clone(),
            ..saved
        };
        overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.experiment.is_empty() {
            return Err(ConfigError::Validation("experiment must not be empty".into()));
        }
        if self.env.is_empty() {
            return Err(ConfigError::Validation("env must not be empty".into()));
        }
        if self.env_frameskip == 0 {
            return Err(ConfigError::Validation("env_frameskip must be >= 1".into()));
        }
        if self.eval_env_frameskip == Some(0) {
            return Err(ConfigError::Validation(
                "eval_env_frameskip must be >= 1".into(),
            ));
        }
        if self.num_envs == 0 {
            return Err(ConfigError::Validation("num_envs must be >= 1".into()));
        }
        if self.device.is_empty() {
            return Err(ConfigError::Validation("device must not be empty".into()));
        }
        if self.model.encoder_mlp_layers.iter().any(|&w| w == 0) {
            return Err(ConfigError::Validation(
                "model.encoder_mlp_layers entries must be > 0".into(),
            ));
        }
        if self.model.use_rnn && self.model.rnn_size == 0 {
            return Err(ConfigError::Validation("model.rnn_size must be > 0".into()));
        }
        if self.export.traced_model_name.is_empty() {
            return Err(ConfigError::Validation(
                "export.traced_model_name must not be empty".into(),
            ));
        }
        if !(self.export.verify_tolerance >= 0.0) {
            return Err(ConfigError::Validation(
                "export.verify_tolerance must be >= 0".into(),
            ));
        }
        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).expect("default config serializes")
    }
}

/// Settings passed explicitly by the operator at export time.
///
/// Unset fields leave the saved experiment value alone. Deserializes from the
/// top-level keys of an operator TOML file; other keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub env_frameskip: Option<u32>,
    pub eval_env_frameskip: Option<u32>,
    pub save_video: Option<bool>,
    pub no_render: Option<bool>,
    pub policy_index: Option<usize>,
    pub load_checkpoint_kind: Option<CheckpointKind>,
    pub device: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl ConfigOverrides {
    /// Keys set in an operator TOML file. A missing file sets nothing.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Fields set in `self` win; the rest are taken from `fallback`.
    pub fn or(self, fallback: ConfigOverrides) -> Self {
        ConfigOverrides {
            env_frameskip: self.env_frameskip.or(fallback.env_frameskip),
            eval_env_frameskip: self.eval_env_frameskip.or(fallback.eval_env_frameskip),
            save_video: self.save_video.or(fallback.save_video),
            no_render: self.no_render.or(fallback.no_render),
            policy_index: self.policy_index.or(fallback.policy_index),
            load_checkpoint_kind: self.load_checkpoint_kind.or(fallback.load_checkpoint_kind),
            device: self.device.or(fallback.device),
            output_dir: self.output_dir.or(fallback.output_dir),
            seed: self.seed.or(fallback.seed),
        }
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = self.env_frameskip {
            config.env_frameskip = v;
        }
        if let Some(v) = self.eval_env_frameskip {
            config.eval_env_frameskip = Some(v);
        }
        if let Some(v) = self.save_video {
            config.save_video = v;
        }
        if let Some(v) = self.no_render {
            config.no_render = v;
        }
        if let Some(v) = self.policy_index {
            config.policy_index = v;
        }
        if let Some(v) = self.load_checkpoint_kind {
            config.load_checkpoint_kind = v;
        }
        if let Some(v) = &self.device {
            config.device = v.clone();
        }
        if let Some(v) = &self.output_dir {
            config.export.output_dir = v.clone();
        }
        if let Some(v) = self.seed {
            config.export.seed = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
env_frameskip = 4

[model]
rnn_size = 64
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.env_frameskip, 4);
        assert_eq!(config.model.rnn_size, 64);
        assert_eq!(config.model.encoder_mlp_layers, vec![512, 512]);
        assert_eq!(config.load_checkpoint_kind, CheckpointKind::Latest);
        assert!(config.eval_env_frameskip.is_none());
    }

    #[test]
    fn test_checkpoint_kind_parses() {
        assert_eq!("latest".parse::<CheckpointKind>().unwrap(), CheckpointKind::Latest);
        assert_eq!("best".parse::<CheckpointKind>().unwrap(), CheckpointKind::Best);
        let err = "newest".parse::<CheckpointKind>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCheckpointKind(ref k) if k == "newest"));
    }

    #[test]
    fn test_unknown_checkpoint_kind_in_toml_is_rejected() {
        let result: Result<Config, _> = toml::from_str(r#"load_checkpoint_kind = "newest""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_zero_frameskip() {
        let mut config = Config::default();
        config.env_frameskip = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.eval_env_frameskip = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_rnn_size() {
        let mut config = Config::default();
        config.model.rnn_size = 0;
        assert!(config.validate().is_err());

        config.model.use_rnn = false;
        config.validate().expect("rnn_size is unused without an rnn");
    }

    #[test]
    fn test_validation_rejects_negative_tolerance() {
        let mut config = Config::default();
        config.export.verify_tolerance = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("nonexistent_export.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
experiment = "doom_run"
device = "cpu"
load_checkpoint_kind = "best"
"#
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.experiment, "doom_run");
        assert_eq!(config.device, "cpu");
        assert_eq!(config.load_checkpoint_kind, CheckpointKind::Best);
        assert_eq!(config.env_frameskip, 1);
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let toml_str = Config::default_toml();
        let config: Config = toml::from_str(&toml_str).unwrap();
        config.validate().expect("roundtripped config should be valid");
    }

    #[test]
    fn test_load_from_checkpoint_merges_saved_and_eval_settings() {
        let dir = tempfile::tempdir().unwrap();
        let saved = Config {
            train_dir: dir.path().to_path_buf(),
            experiment: "exp".into(),
            env: "lunar_lander".into(),
            env_frameskip: 4,
            num_envs: 16,
            device: "gpu".into(),
            model: ModelConfig {
                encoder_mlp_layers: vec![32],
                rnn_size: 16,
                ..ModelConfig::default()
            },
            ..Config::default()
        };
        saved.save_experiment_config().unwrap();

        let caller = Config {
            train_dir: dir.path().to_path_buf(),
            experiment: "exp".into(),
            ..Config::default()
        };
        let overrides = ConfigOverrides {
            eval_env_frameskip: Some(2),
            load_checkpoint_kind: Some(CheckpointKind::Best),
            device: Some("cpu".into()),
            no_render: Some(true),
            ..ConfigOverrides::default()
        };

        let merged = caller.load_from_checkpoint(&overrides).unwrap();
        assert_eq!(merged.env, "lunar_lander");
        assert_eq!(merged.env_frameskip, 4);
        assert_eq!(merged.num_envs, 16);
        assert_eq!(merged.model.rnn_size, 16);
        assert_eq!(merged.device, "cpu");
        assert!(merged.no_render);
        assert_eq!(merged.eval_env_frameskip, Some(2));
        assert_eq!(merged.load_checkpoint_kind, CheckpointKind::Best);
    }

    #[test]
    fn test_load_from_checkpoint_keeps_saved_eval_settings() {
        let dir = tempfile::tempdir().unwrap();
        let saved = Config {
            train_dir: dir.path().to_path_buf(),
            experiment: "exp".into(),
            env_frameskip: 4,
            eval_env_frameskip: Some(2),
            device: "cpu".into(),
            policy_index: 1,
            save_video: true,
            load_checkpoint_kind: CheckpointKind::Best,
            ..Config::default()
        };
        saved.save_experiment_config().unwrap();

        let mut caller = Config {
            train_dir: dir.path().to_path_buf(),
            experiment: "exp".into(),
            ..Config::default()
        };
        caller.export.seed = Some(3);

        let merged = caller
            .load_from_checkpoint(&ConfigOverrides::default())
            .unwrap();
        assert_eq!(merged.env_frameskip, 4);
        assert_eq!(merged.eval_env_frameskip, Some(2));
        assert_eq!(merged.device, "cpu");
        assert_eq!(merged.policy_index, 1);
        assert!(merged.save_video);
        assert_eq!(merged.load_checkpoint_kind, CheckpointKind::Best);
        assert_eq!(merged.export.seed, Some(3));
    }

    #[test]
    fn test_overrides_from_toml_only_set_written_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.toml");
        std::fs::write(
            &path,
            r#"
experiment = "lander"
device = "cpu"
save_video = false

[export]
seed = 11
"#,
        )
        .unwrap();

        let from_file = ConfigOverrides::from_toml_file(&path).unwrap();
        assert_eq!(from_file.device.as_deref(), Some("cpu"));
        assert_eq!(from_file.save_video, Some(false));
        assert_eq!(from_file.eval_env_frameskip, None);
        assert_eq!(from_file.policy_index, None);

        let cli = ConfigOverrides {
            device: Some("gpu".into()),
            policy_index: Some(2),
            ..ConfigOverrides::default()
        };
        let merged = cli.or(from_file);
        assert_eq!(merged.device.as_deref(), Some("gpu"));
        assert_eq!(merged.policy_index, Some(2));
        assert_eq!(merged.save_video, Some(false));

        let missing = ConfigOverrides::from_toml_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing, ConfigOverrides::default());
    }

    #[test]
    fn test_load_from_checkpoint_missing_saved_config() {
        let dir = tempfile::tempdir().unwrap();
        let caller = Config {
            train_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let err = caller
            .load_from_checkpoint(&ConfigOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::SavedConfigMissing(_)));
    }
}
