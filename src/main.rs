//! avdctl - Android emulator lifecycle tool
//!
//! Without arguments, provisions and boots the configured AVD;
//! `kill`/`stop` shuts one running emulator down.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use avdctl::cli::{Cli, Command};
use avdctl::commands::{exit_code, BootCommand, KillCommand, Outcome};
use avdctl::core::{EmulatorConfig, PartialConfig, APP_NAME, VERSION};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: logging disabled: {}", e);
    }

    debug!("{} v{} starting", APP_NAME, VERSION);

    let result = run(cli).await;
    if let Err(e) = &result {
        eprintln!("error: {}", one_line(&format!("{:#}", e)));
    }

    ExitCode::from(exit_code(&result))
}

async fn run(cli: Cli) -> Result<Outcome> {
    let config = load_config(&cli).await?;

    let outcome = match cli.command {
        None => Outcome::Booted(BootCommand { config }.execute().await?),
        Some(Command::Kill { serial }) => Outcome::Kill(KillCommand { config, serial }.execute().await?),
    };

    Ok(outcome)
}

/// Merge flags/env, the config file and defaults
async fn load_config(cli: &Cli) -> Result<EmulatorConfig> {
    let overrides = cli.settings.to_partial();

    let file = match &cli.settings.config {
        Some(path) => PartialConfig::load(path)
            .await
            .with_context(|| format!("reading config file {}", path.display()))?,
        None => match PartialConfig::default_path() {
            Some(path) if path.exists() => PartialConfig::load(&path)
                .await
                .with_context(|| format!("reading config file {}", path.display()))?,
            _ => PartialConfig::default(),
        },
    };

    let config = EmulatorConfig::resolve(overrides.or(file))?;
    debug!("Resolved configuration: {:?}", config);
    Ok(config)
}

/// Collapse multi-line diagnostics (e.g. TOML errors) into one line
fn one_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
