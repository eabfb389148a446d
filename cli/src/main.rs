use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rotascope_cli::commands::{self, ReplayArgs};
use rotascope_cli::logging;
use rotascope_core::config::{EngineConfig, EngineConfigExt};

#[derive(Parser)]
#[command(version, about = "Rotation tracking tools")]
struct Cli {
    /// Engine config file (defaults to the user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a rotation file and show its structure
    Check {
        path: PathBuf,
        /// Ability catalog; enables the missing-operator check
        #[arg(long)]
        abilities: Option<PathBuf>,
    },
    /// Print a rotation file in canonical form
    Format { path: PathBuf },
    /// Look for abilities in a single image
    Detect {
        #[arg(long)]
        frame: PathBuf,
        #[arg(long)]
        templates: Option<PathBuf>,
        #[arg(long)]
        abilities: Option<PathBuf>,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Run a rotation against a directory of PNG frames
    Replay {
        #[arg(long)]
        rotation: PathBuf,
        #[arg(long)]
        frames: PathBuf,
        #[arg(long)]
        templates: Option<PathBuf>,
        #[arg(long)]
        abilities: Option<PathBuf>,
        /// Hold the sequence until this ability is seen when it is next
        #[arg(long)]
        gated: Option<String>,
        /// Abilities whose cast is zeroed right after the gated one
        #[arg(long = "follow-up")]
        follow_ups: Vec<String>,
        #[arg(long)]
        looping: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Config first: it decides where logs go
    let (config, fallback) = match cli.config.as_deref() {
        Some(path) => match EngineConfig::load_from(path) {
            Ok(config) => (config, None),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => match EngineConfig::try_load() {
            Ok(config) => (config, None),
            Err(e) => (EngineConfig::default(), Some(e)),
        },
    };
    let _log_guard = logging::init(&config.logging);
    if let Some(e) = fallback {
        tracing::warn!(error = %e, "Could not load config, using defaults");
    }

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: EngineConfig) -> Result<(), String> {
    match command {
        Commands::Check { path, abilities } => commands::check(&path, abilities.as_deref(), &config),
        Commands::Format { path } => commands::format(&path, &config),
        Commands::Detect {
            frame,
            templates,
            abilities,
            keys,
        } => commands::detect(&frame, templates.as_deref(), abilities.as_deref(), &keys, &config),
        Commands::Replay {
            rotation,
            frames,
            templates,
            abilities,
            gated,
            follow_ups,
            looping,
        } => {
            let args = ReplayArgs {
                rotation,
                frames,
                templates,
                abilities,
                gated,
                follow_ups,
                looping,
            };
            commands::replay(args, config).await
        }
    }
}
