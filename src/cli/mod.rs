//! Command-line interface for modcache.
//!
//! Each subcommand opens a single manifest in a fresh session and asks the
//! cache for one piece of derived information:
//!
//! - `parse` - parse `go.mod` and summarize its statements and `go.sum`
//! - `why` - explain why each requirement is needed (`go mod why -m`)
//! - `upgrades` - list available upgrades (`go list -u -m -json all`)
//! - `diagnose` - turn a `go` command error message into diagnostics
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: no logging at all
//! - `--config` / `-c`: configuration file (default `~/.modcache/config.toml`),
//!   also read from `MODCACHE_CONFIG`
//!
//! `RUST_LOG` takes precedence over both logging flags.
//!
//! ```bash
//! modcache parse ./go.mod
//! modcache --verbose upgrades ./go.mod --json
//! modcache diagnose ./go.mod "go: example.com@v1.2.2: missing go.sum entry; to add it:"
//! ```

mod common;
mod diagnose;
mod parse;
mod upgrades;
mod why;

pub use common::CommandContext;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter when `RUST_LOG` is unset; `None` disables logging.
    pub log_level: Option<String>,

    /// Configuration file given with `--config`.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the global tracing subscriber on stderr.
    pub fn init_logging(&self) {
        let filter = match (std::env::var("RUST_LOG"), &self.log_level) {
            (Ok(_), _) => EnvFilter::from_default_env(),
            (Err(_), Some(level)) => EnvFilter::new(level),
            (Err(_), None) => return,
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    }
}

#[derive(Parser)]
#[command(
    name = "modcache",
    about = "Cached go.mod analysis with structured go command diagnostics",
    version,
    author,
    long_about = "modcache parses go.mod files, runs `go mod why` and `go list -u` against them \
                  at most once per file content, and maps go command errors back onto the \
                  go.mod statements that caused them."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable all logging
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, value_name = "PATH", env = crate::constants::CONFIG_PATH_ENV)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a go.mod file and summarize it
    Parse(parse::ParseCommand),

    /// Explain why each requirement is needed
    Why(why::WhyCommand),

    /// List modules with available upgrades
    Upgrades(upgrades::UpgradesCommand),

    /// Map a go command error message onto go.mod statements
    Diagnose(diagnose::DiagnoseCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("warn".to_string())
        };

        CliConfig {
            log_level,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Parse(cmd) => cmd.execute(&config).await,
            Commands::Why(cmd) => cmd.execute(&config).await,
            Commands::Upgrades(cmd) => cmd.execute(&config).await,
            Commands::Diagnose(cmd) => cmd.execute(&config).await,
        }
    }
}
