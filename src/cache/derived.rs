//! Derived-info caches: dependency explanations ("why") and available
//! upgrades.
//!
//! Both run the `go` command at most once per [`ModKey`] and memoize the
//! decoded result. A failed run is cached as well; the caller can hand the
//! error text to [`Snapshot::extract_go_command_errors`] to turn it into
//! diagnostics.

use super::{CacheKey, CachedValue, ModAction, ModKey, Registry, Snapshot};
use crate::constants::{VENDOR_DIR, WHY_BLOCK_SEPARATOR};
use crate::core::ModError;
use crate::gocmd::{Invocation, RunMode};
use crate::source::{FileHandle, FileKind};
use futures::FutureExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;

type DerivedResult = Result<Arc<HashMap<String, String>>, ModError>;

impl Snapshot {
    /// Why each requirement of the manifest `fh` is needed, keyed by module
    /// path.
    pub async fn mod_why(self: &Arc<Self>, fh: &Arc<dyn FileHandle>) -> DerivedResult {
        self.derived(fh, ModAction::Why).await
    }

    /// The newer version available for each module in the build list, keyed
    /// by module path. Modules without an update are omitted.
    pub async fn mod_upgrade(self: &Arc<Self>, fh: &Arc<dyn FileHandle>) -> DerivedResult {
        self.derived(fh, ModAction::Upgrade).await
    }

    /// The key a derived computation on `fh` is memoized under.
    pub fn mod_key(&self, fh: &Arc<dyn FileHandle>, action: ModAction) -> ModKey {
        ModKey {
            session_id: self.session.id.clone(),
            env: self.view.env_hash().to_string(),
            view: self.view.root().to_path_buf(),
            file: fh.identity().clone(),
            action,
        }
    }

    async fn derived(self: &Arc<Self>, fh: &Arc<dyn FileHandle>, action: ModAction) -> DerivedResult {
        if fh.kind() != FileKind::Mod {
            return Err(ModError::NotAManifest {
                uri: fh.uri().clone(),
            });
        }

        let key = CacheKey::Derived(self.mod_key(fh, action));
        let registry = match action {
            ModAction::Why => Registry::ModWhy,
            ModAction::Upgrade => Registry::ModUpgrade,
        };
        let file = Arc::clone(fh);
        let handle = self.handle_for(registry, fh.uri(), key, move |snapshot| {
            async move {
                let result = match action {
                    ModAction::Why => compute_why(snapshot, file).await,
                    ModAction::Upgrade => compute_upgrade(snapshot, file).await,
                };
                CachedValue::Derived(result)
            }
            .boxed()
        })?;

        match &*self.await_handle(&handle).await? {
            CachedValue::Derived(result) => result.clone(),
            CachedValue::Parsed(_) => Err(Self::unexpected_value(&handle)),
        }
    }
}

async fn compute_why(snapshot: Arc<Snapshot>, fh: Arc<dyn FileHandle>) -> DerivedResult {
    let span = tracing::debug_span!("cache.mod_why", uri = %fh.uri());
    async move {
        let parsed = snapshot.parse_manifest(&fh).await?;
        if parsed.file.require.is_empty() {
            return Ok(Arc::new(HashMap::new()));
        }

        let requirements: Vec<String> =
            parsed.file.require.iter().map(|r| r.module.path.clone()).collect();
        let invocation = Invocation::new("mod")
            .args(["why", "-m"])
            .args(requirements.iter().cloned())
            .working_dir(fh.uri().dir())
            .run_mode(RunMode::NORMAL);
        let stdout = snapshot.run_go_command_direct(invocation).await?;
        explain_requirements(&requirements, &stdout).map(Arc::new)
    }
    .instrument(span)
    .await
}

async fn compute_upgrade(snapshot: Arc<Snapshot>, fh: Arc<dyn FileHandle>) -> DerivedResult {
    let span = tracing::debug_span!("cache.mod_upgrade", uri = %fh.uri());
    async move {
        let parsed = snapshot.parse_manifest(&fh).await?;
        if parsed.file.require.is_empty() {
            return Ok(Arc::new(HashMap::new()));
        }

        let dir = fh.uri().dir();
        let mut invocation = Invocation::new("list")
            .args(["-u", "-m", "-json", "all"])
            .working_dir(dir)
            .run_mode(RunMode::ALLOW_NETWORK);
        if !snapshot.view.temp_modfile() || contains_vendor(dir).await {
            invocation = invocation.mod_flag("readonly");
        }
        let stdout = snapshot.run_go_command_direct(invocation).await?;
        decode_upgrades(&stdout).map(Arc::new)
    }
    .instrument(span)
    .await
}

/// Whether `dir` has a `vendor/` directory.
pub async fn contains_vendor(dir: &Path) -> bool {
    tokio::fs::metadata(dir.join(VENDOR_DIR)).await.is_ok_and(|m| m.is_dir())
}

/// Pairs `go mod why -m` output blocks with the requirements they explain.
///
/// The tool prints one block per argument, in argument order, separated by a
/// blank line. A different number of blocks is an error rather than a
/// partial result.
pub fn explain_requirements(
    requirements: &[String],
    stdout: &str,
) -> Result<HashMap<String, String>, ModError> {
    let blocks: Vec<&str> = stdout.split(WHY_BLOCK_SEPARATOR).collect();
    if blocks.len() != requirements.len() {
        return Err(ModError::MismatchedWhyResults {
            got: blocks.len(),
            want: requirements.len(),
        });
    }
    Ok(requirements.iter().cloned().zip(blocks.into_iter().map(str::to_string)).collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedModule {
    path: String,
    #[serde(default)]
    update: Option<ListedUpdate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedUpdate {
    #[serde(default)]
    version: String,
}

/// Decodes the JSON object stream printed by `go list -u -m -json all` into
/// `path -> newer version`.
///
/// The first record is the main module and is skipped.
pub fn decode_upgrades(stdout: &str) -> Result<HashMap<String, String>, ModError> {
    let records = serde_json::Deserializer::from_str(stdout)
        .into_iter::<ListedModule>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ModError::DecodeUpgrade {
            message: e.to_string(),
        })?;

    Ok(records
        .into_iter()
        .skip(1)
        .filter_map(|module| {
            let update = module.update?;
            (!update.version.is_empty()).then_some((module.path, update.version))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn test_explain_requirements_counts_blocks() {
        let stdout = "# a.com/x\nexample.com/app\na.com/x\n\n# b.com/y\n(main module does not need module b.com/y)\n";
        let why = explain_requirements(&deps(&["a.com/x", "b.com/y"]), stdout).unwrap();
        assert_eq!(why.len(), 2);
        assert_eq!(why["a.com/x"], "# a.com/x\nexample.com/app\na.com/x");
        assert!(why["b.com/y"].contains("does not need"));

        assert!(matches!(
            explain_requirements(&deps(&["a.com/x"]), stdout),
            Err(ModError::MismatchedWhyResults { got: 2, want: 1 })
        ));
        assert!(matches!(
            explain_requirements(&deps(&["a.com/x", "b.com/y", "c.com/z"]), stdout),
            Err(ModError::MismatchedWhyResults { got: 2, want: 3 })
        ));
    }

    #[test]
    fn test_decode_upgrades_discards_main_module() {
        let stdout = r#"{"Path": "example.com/app", "Main": true}
{"Path": "a.com/x", "Version": "v1.0.0", "Update": {"Path": "a.com/x", "Version": "v1.2.0"}}
{"Path": "b.com/y", "Version": "v0.3.0"}
"#;
        let upgrades = decode_upgrades(stdout).unwrap();
        assert_eq!(upgrades, HashMap::from([("a.com/x".to_string(), "v1.2.0".to_string())]));
    }

    #[test]
    fn test_decode_upgrades_edge_cases() {
        assert!(decode_upgrades("").unwrap().is_empty());
        assert!(decode_upgrades(r#"{"Path": "example.com/app"}"#).unwrap().is_empty());
        assert!(matches!(
            decode_upgrades(r#"{"Path": "example.com/app"} {"Path": "#),
            Err(ModError::DecodeUpgrade { .. })
        ));
    }

    #[tokio::test]
    async fn test_contains_vendor() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(!contains_vendor(temp.path()).await);
        std::fs::write(temp.path().join("vendor"), "not a dir").unwrap();
        assert!(!contains_vendor(temp.path()).await);
        std::fs::remove_file(temp.path().join("vendor")).unwrap();
        std::fs::create_dir(temp.path().join("vendor")).unwrap();
        assert!(contains_vendor(temp.path()).await);
    }
}
