//! `modcache why`: explain each requirement.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::CliConfig;
use super::common::{CommandContext, print_sorted_map, report_failure};

#[derive(Debug, Args)]
pub struct WhyCommand {
    /// Path to the go.mod file
    #[arg(value_name = "GO_MOD")]
    pub manifest: PathBuf,

    /// Print the explanations as a JSON object
    #[arg(long)]
    pub json: bool,
}

impl WhyCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let ctx = CommandContext::open(&self.manifest, config.config_path.clone()).await?;
        match ctx.snapshot.mod_why(&ctx.manifest).await {
            Ok(why) if self.json => print_sorted_map(&why, true),
            Ok(why) => {
                let mut paths: Vec<&String> = why.keys().collect();
                paths.sort();
                for path in paths {
                    println!("{}\n", why[path].trim_end());
                }
                Ok(())
            }
            Err(error) => report_failure(&ctx, error, self.json).await,
        }
    }
}
