//! `modcache diagnose`: map a `go` command error onto the manifest.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

use super::CliConfig;
use super::common::{CommandContext, print_diagnostics};

#[derive(Debug, Args)]
pub struct DiagnoseCommand {
    /// Path to the go.mod file
    #[arg(value_name = "GO_MOD")]
    pub manifest: PathBuf,

    /// Error text printed by the go command; `-` reads it from stdin
    #[arg(value_name = "MESSAGE")]
    pub message: String,

    /// Print diagnostics as a JSON array
    #[arg(long)]
    pub json: bool,
}

impl DiagnoseCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let message = if self.message == "-" {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await.context("Failed to read message from stdin")?;
            buf
        } else {
            self.message
        };

        let ctx = CommandContext::open(&self.manifest, config.config_path.clone()).await?;
        let diagnostics = ctx.snapshot.extract_go_command_errors(&ctx.manifest, &message).await;
        if diagnostics.is_empty() && !self.json {
            println!("no diagnostics");
            return Ok(());
        }
        print_diagnostics(&diagnostics, self.json)
    }
}
