#![recursion_limit = "256"]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use policy_export::config::{CheckpointKind, Config, ConfigOverrides};
use policy_export::env::EnvRegistry;
use policy_export::export::{ExportPipeline, ExportStatus};

/// Export a trained policy checkpoint as a traced inference graph.
#[derive(Parser)]
#[command(name = "export", about = "Export a trained policy as a traced graph")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "export.toml")]
    config: PathBuf,

    /// Root directory of training runs
    #[arg(long)]
    train_dir: Option<PathBuf>,

    /// Experiment name under the train directory
    #[arg(long)]
    experiment: Option<String>,

    /// Override the training frameskip
    #[arg(long)]
    env_frameskip: Option<u32>,

    /// Frameskip used for evaluation
    #[arg(long)]
    eval_env_frameskip: Option<u32>,

    /// Render off-screen for video recording (`--save-video false` turns it off)
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    save_video: Option<bool>,

    /// Disable rendering (`--no-render false` turns rendering back on)
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    no_render: Option<bool>,

    /// Which policy's checkpoints to load
    #[arg(long)]
    policy_index: Option<usize>,

    /// Checkpoint kind: latest or best
    #[arg(long)]
    load_checkpoint_kind: Option<String>,

    /// Device: cpu, or anything else for the accelerator
    #[arg(long)]
    device: Option<String>,

    /// Directory the traced artifact is written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Seed for the example observation
    #[arg(long)]
    seed: Option<u64>,

    /// Width of the example observation
    #[arg(long, required_unless_present = "print_default_config")]
    obs_width: Option<usize>,

    /// Width of the recurrent state
    #[arg(long, required_unless_present = "print_default_config")]
    state_width: Option<usize>,

    /// Print a config file with all default values and exit
    #[arg(long)]
    print_default_config: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let result = run(Cli::parse());
    if let Err(e) = &result {
        eprintln!("Error: {e:?}");
    }
    ExportStatus::of(&result).into()
}

fn run(cli: Cli) -> Result<()> {
    if cli.print_default_config {
        print!("{}", Config::default_toml());
        return Ok(());
    }

    // Load configuration
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(train_dir) = cli.train_dir {
        config.train_dir = train_dir;
    }
    if let Some(experiment) = cli.experiment {
        config.experiment = experiment;
    }

    let load_checkpoint_kind = match cli.load_checkpoint_kind.as_deref() {
        Some(kind) => Some(kind.parse::<CheckpointKind>()?),
        None => None,
    };
    let obs_width = cli.obs_width.context("--obs-width is required")?;
    let state_width = cli.state_width.context("--state-width is required")?;
    if obs_width == 0 {
        bail!("--obs-width must be > 0");
    }

    // Keys written in the config file count as explicit; the command line wins.
    let file_overrides = ConfigOverrides::from_toml_file(&cli.config)
        .with_context(|| format!("reading overrides from {}", cli.config.display()))?;
    let overrides = ConfigOverrides {
        env_frameskip: cli.env_frameskip,
        eval_env_frameskip: cli.eval_env_frameskip,
        save_video: cli.save_video,
        no_render: cli.no_render,
        policy_index: cli.policy_index,
        load_checkpoint_kind,
        device: cli.device,
        output_dir: cli.output_dir,
        seed: cli.seed,
    }
    .or(file_overrides);

    let envs = EnvRegistry::with_builtin();
    let report = ExportPipeline::new(&envs)
        .export_on_configured_device(&config, &overrides, obs_width, state_width)
        .with_context(|| {
            format!(
                "exporting experiment {}",
                config.experiment_dir().display()
            )
        })?;

    tracing::info!(
        path = %report.artifact_path.display(),
        train_step = report.train_step,
        num_params = report.num_params,
        "export complete"
    );
    Ok(())
}
