//! `modcache parse`: summarize a manifest and its checksum file.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::CliConfig;
use super::common::{CommandContext, report_failure};
use crate::cache::ParsedManifest;
use crate::modfile::sum::parse_sum;

#[derive(Debug, Args)]
pub struct ParseCommand {
    /// Path to the go.mod file
    #[arg(value_name = "GO_MOD")]
    pub manifest: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RequireSummary {
    pub path: String,
    pub version: String,
    pub indirect: bool,
    pub line: u32,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ParseSummary {
    pub module: Option<String>,
    pub go: Option<String>,
    pub toolchain: Option<String>,
    pub require: Vec<RequireSummary>,
    pub exclude: usize,
    pub replace: usize,
    pub retract: usize,
    /// `None` when there is no checksum file.
    pub sum_entries: Option<usize>,
}

impl ParseSummary {
    pub fn new(parsed: &ParsedManifest, sum: Option<&[u8]>) -> Self {
        let file = &parsed.file;
        Self {
            module: file.module.as_ref().map(|m| m.path.clone()),
            go: file.go.as_ref().map(|g| g.version.clone()),
            toolchain: file.toolchain.as_ref().map(|t| t.name.clone()),
            require: file
                .require
                .iter()
                .map(|r| RequireSummary {
                    path: r.module.path.clone(),
                    version: r.module.version.clone(),
                    indirect: r.indirect,
                    line: r.syntax.start.line,
                })
                .collect(),
            exclude: file.exclude.len(),
            replace: file.replace.len(),
            retract: file.retract.len(),
            sum_entries: sum.map(|content| parse_sum(content).len()),
        }
    }

    fn print(&self) {
        println!("{} {}", "module".bold(), self.module.as_deref().unwrap_or("<none>"));
        if let Some(go) = &self.go {
            println!("{} {}", "go".bold(), go);
        }
        if let Some(toolchain) = &self.toolchain {
            println!("{} {}", "toolchain".bold(), toolchain);
        }
        println!("{} {}", "requires".bold(), self.require.len());
        for require in &self.require {
            let marker = if require.indirect {
                " // indirect".dimmed().to_string()
            } else {
                String::new()
            };
            println!("  {} {}{}", require.path, require.version.cyan(), marker);
        }
        println!(
            "{} {}, {} {}, {} {}",
            "excludes".bold(),
            self.exclude,
            "replaces".bold(),
            self.replace,
            "retracts".bold(),
            self.retract
        );
        match self.sum_entries {
            Some(count) => println!("{} {} entries", "go.sum".bold(), count),
            None => println!("{} {}", "go.sum".bold(), "missing".yellow()),
        }
    }
}

impl ParseCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let ctx = CommandContext::open(&self.manifest, config.config_path.clone()).await?;
        let parsed = match ctx.snapshot.parse_manifest(&ctx.manifest).await {
            Ok(parsed) => parsed,
            Err(error) => return report_failure(&ctx, error, self.json).await,
        };

        let sum = ctx.snapshot.go_sum(ctx.manifest.uri()).await;
        let summary = ParseSummary::new(&parsed, sum.as_deref());
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            summary.print();
        }
        Ok(())
    }
}
