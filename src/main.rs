//! modcache CLI entry point
//!
//! Parses arguments, runs the selected subcommand and renders failures with
//! suggestions:
//! - `parse` - summarize a go.mod file
//! - `why` - explain each requirement
//! - `upgrades` - list available upgrades
//! - `diagnose` - map a go command error onto go.mod statements

use anyhow::Result;
use clap::Parser;
use modcache::cli;
use modcache::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
