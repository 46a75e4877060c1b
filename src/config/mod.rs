//! Configuration for modcache.
//!
//! Settings live in a TOML file:
//!
//! - Unix/macOS: `~/.modcache/config.toml`
//! - Windows: `%LOCALAPPDATA%\modcache\config.toml`
//! - Override: `--config <path>`, which the CLI also reads from `MODCACHE_CONFIG`
//!
//! A missing file means defaults. `MODCACHE_GO` overrides `go_binary`.
//!
//! ```toml
//! go_binary = "/usr/local/go/bin/go"
//! command_timeout_secs = 120
//! temp_modfile = false
//!
//! [env]
//! GOFLAGS = "-mod=mod"
//! GOPRIVATE = "example.com/private"
//! ```

use crate::constants::{CONFIG_DIR_NAME, default_command_timeout};
use crate::core::ModError;
use crate::gocmd::ProcessRunner;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

fn default_go_binary() -> String {
    "go".to_string()
}

fn default_command_timeout_secs() -> u64 {
    default_command_timeout().as_secs()
}

/// User configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name or path of the `go` binary.
    pub go_binary: String,

    /// Timeout for one `go` invocation, in seconds.
    pub command_timeout_secs: u64,

    /// Extra environment for every invocation. Part of the view's
    /// environment fingerprint, so changing it invalidates derived results.
    pub env: BTreeMap<String, String>,

    /// Whether the view runs the tool against a temporary copy of the
    /// manifest. When false, listing always passes `-mod=readonly`.
    pub temp_modfile: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            go_binary: default_go_binary(),
            command_timeout_secs: default_command_timeout_secs(),
            env: BTreeMap::new(),
            temp_modfile: false,
        }
    }
}

impl CacheConfig {
    /// Loads the configuration from `path`, or from the default location when
    /// `path` is `None`. A missing file yields the defaults; overrides from
    /// the environment are applied either way.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| Self::default_path().ok());
        let config = match path {
            Some(path) if path.exists() => Self::load_from(&path).await?,
            _ => Self::default(),
        };
        let config = config.with_go_override(std::env::var(crate::constants::GO_BINARY_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Loads the configuration from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// `~/.modcache/config.toml`, or `%LOCALAPPDATA%\modcache\config.toml` on
    /// Windows.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("modcache")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(CONFIG_DIR_NAME)
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Replaces `go_binary` when an override is present and non-empty.
    #[must_use]
    pub fn with_go_override(mut self, go_binary: Option<String>) -> Self {
        if let Some(go_binary) = go_binary.filter(|b| !b.trim().is_empty()) {
            tracing::debug!(target: "config", "go binary overridden: {}", go_binary);
            self.go_binary = go_binary;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ModError> {
        if self.go_binary.trim().is_empty() {
            return Err(ModError::Config {
                message: "go_binary must not be empty".to_string(),
            });
        }
        if self.command_timeout_secs == 0 {
            return Err(ModError::Config {
                message: "command_timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// A subprocess runner for the configured binary and timeout.
    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new(self.go_binary.clone(), self.command_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.go_binary, "go");
        assert_eq!(config.command_timeout(), Duration::from_secs(300));
        assert!(config.env.is_empty());
        assert!(!config.temp_modfile);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "command_timeout_secs = 30\n\n[env]\nGOFLAGS = \"-mod=mod\"\n").unwrap();

        let config = CacheConfig::load_from(&path).await.unwrap();
        assert_eq!(config.go_binary, "go");
        assert_eq!(config.command_timeout_secs, 30);
        assert_eq!(config.env.get("GOFLAGS").map(String::as_str), Some("-mod=mod"));
    }

    #[tokio::test]
    async fn test_load_from_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "command_timeout_secs = 0\n").unwrap();
        let error = CacheConfig::load_from(&path).await.unwrap_err();
        assert!(format!("{error:#}").contains("greater than zero"));

        std::fs::write(&path, "go_binary = [\n").unwrap();
        let error = CacheConfig::load_from(&path).await.unwrap_err();
        assert!(error.to_string().contains("Failed to parse config"));
    }

    #[tokio::test]
    async fn test_missing_explicit_path_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config =
            CacheConfig::load_with_optional(Some(temp.path().join("absent.toml"))).await.unwrap();
        assert_eq!(config.command_timeout_secs, 300);
    }

    #[test]
    fn test_go_override() {
        let config = CacheConfig::default().with_go_override(Some("/opt/go/bin/go".to_string()));
        assert_eq!(config.go_binary, "/opt/go/bin/go");
        assert_eq!(config.runner().go_binary(), "/opt/go/bin/go");

        let config = CacheConfig::default().with_go_override(Some("  ".to_string()));
        assert_eq!(config.go_binary, "go");
    }
}
