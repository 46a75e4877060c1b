//! `modcache upgrades`: list available upgrades.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::CliConfig;
use super::common::{CommandContext, print_sorted_map, report_failure};

#[derive(Debug, Args)]
pub struct UpgradesCommand {
    /// Path to the go.mod file
    #[arg(value_name = "GO_MOD")]
    pub manifest: PathBuf,

    /// Print `path -> version` as a JSON object
    #[arg(long)]
    pub json: bool,
}

impl UpgradesCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let ctx = CommandContext::open(&self.manifest, config.config_path.clone()).await?;
        let upgrades = match ctx.snapshot.mod_upgrade(&ctx.manifest).await {
            Ok(upgrades) => upgrades,
            Err(error) => return report_failure(&ctx, error, self.json).await,
        };

        if !self.json && upgrades.is_empty() {
            println!("{}", "All dependencies are up to date".green());
            return Ok(());
        }
        print_sorted_map(&upgrades, self.json)
    }
}
