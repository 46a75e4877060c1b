//! Shared plumbing for the subcommands.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{Session, Snapshot, View};
use crate::config::CacheConfig;
use crate::core::ModError;
use crate::diagnostic::Diagnostic;
use crate::source::{DiskFileSource, FileHandle, FileKind};
use crate::span::Uri;

/// A one-shot session over the manifest a command was pointed at.
pub struct CommandContext {
    pub config: CacheConfig,
    pub snapshot: Arc<Snapshot>,
    pub manifest: Arc<dyn FileHandle>,
}

impl CommandContext {
    /// Loads the configuration and opens `manifest_path` in a snapshot
    /// rooted at its directory.
    pub async fn open(manifest_path: &Path, config_path: Option<PathBuf>) -> Result<Self> {
        let config = CacheConfig::load_with_optional(config_path).await?;
        Self::open_with_config(manifest_path, config).await
    }

    pub async fn open_with_config(manifest_path: &Path, config: CacheConfig) -> Result<Self> {
        let manifest_path = std::path::absolute(manifest_path)
            .with_context(|| format!("Failed to resolve {}", manifest_path.display()))?;
        let uri = Uri::from_path(&manifest_path);
        if FileKind::from_path(&manifest_path) != FileKind::Mod {
            return Err(ModError::NotAManifest {
                uri,
            }
            .into());
        }

        let session = Session::new(
            format!("cli-{}", std::process::id()),
            Arc::new(DiskFileSource),
            Arc::new(config.runner()),
        );
        let view = View::from_config(uri.dir(), &config);
        let snapshot = session.new_snapshot(Arc::new(view));
        let manifest = snapshot.get_file(&uri).await?;

        Ok(Self {
            config,
            snapshot,
            manifest,
        })
    }

    /// Diagnostics recovered from a failed derived computation.
    ///
    /// Grammar errors carry their own; `go` command failures are mapped onto
    /// the manifest. Other failures have none.
    pub async fn failure_diagnostics(&self, error: &ModError) -> Vec<Diagnostic> {
        match error {
            ModError::ManifestSyntax {
                diagnostics,
                ..
            } => diagnostics.clone(),
            ModError::GoCommand {
                stderr,
                ..
            } => self.snapshot.extract_go_command_errors(&self.manifest, stderr).await,
            _ => Vec::new(),
        }
    }
}

/// Prints diagnostics as a JSON array or one per line.
pub fn print_diagnostics(diagnostics: &[Diagnostic], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(diagnostics)?);
        return Ok(());
    }
    for diagnostic in diagnostics {
        println!("{diagnostic}");
        for fix in &diagnostic.suggested_fixes {
            println!("  {} {}", "fix:".green(), fix.title);
        }
    }
    Ok(())
}

/// Prints `map` sorted by key, as JSON or `key  value` lines.
pub fn print_sorted_map(map: &std::collections::HashMap<String, String>, json: bool) -> Result<()> {
    let sorted: std::collections::BTreeMap<&String, &String> = map.iter().collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&sorted)?);
    } else {
        for (key, value) in sorted {
            println!("{}  {}", key.bold(), value);
        }
    }
    Ok(())
}

/// Reports a failed computation: diagnostics first, then the error itself.
pub async fn report_failure(ctx: &CommandContext, error: ModError, json: bool) -> Result<()> {
    let diagnostics = ctx.failure_diagnostics(&error).await;
    if !diagnostics.is_empty() {
        print_diagnostics(&diagnostics, json)?;
    }
    Err(error.into())
}
