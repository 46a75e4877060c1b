//! Test fixtures for manifests and temporary projects.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Sample `go.mod` content.
#[derive(Clone, Debug)]
pub struct ManifestFixture {
    pub content: String,
    pub name: String,
}

impl ManifestFixture {
    /// Two direct requirements, one of them indirect, plus a replacement.
    pub fn basic() -> Self {
        Self {
            name: "basic".to_string(),
            content: r"module example.com/app

go 1.21

require (
	golang.org/x/mod v0.4.0
	example.com v1.2.2 // indirect
)

replace example.com/old v1.0.0 => example.com/new v1.1.0
"
            .to_string(),
        }
    }

    /// A module with no requirements.
    pub fn no_requirements() -> Self {
        Self {
            name: "no_requirements".to_string(),
            content: "module example.com/app\n\ngo 1.21\n".to_string(),
        }
    }

    /// Fails to parse on line 3.
    pub fn invalid_syntax() -> Self {
        Self {
            name: "invalid_syntax".to_string(),
            content: "module example.com/app\n\nfrobnicate example.com v1.0.0\n".to_string(),
        }
    }

    /// Write the manifest to `dir/go.mod`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let manifest_path = dir.join("go.mod");
        fs::write(&manifest_path, &self.content)
            .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
        Ok(manifest_path)
    }
}

/// Checksums matching [`ManifestFixture::basic`].
pub const BASIC_SUM: &str = "\
example.com v1.2.2 h1:abcdefabcdefabcdefabcdefabcdefabcdefabcdefa=
example.com v1.2.2/go.mod h1:0123456789012345678901234567890123456789012=
golang.org/x/mod v0.4.0 h1:8pl+sMODzuvGJkmj2W4kZihvVb5mKm8pB/X44PIQHv8=
golang.org/x/mod v0.4.0/go.mod h1:s0Qsj1ACt9ePp/hMypM3fl4fZqREWJwdYDEqhRiZZUA=
";

/// A temporary project directory with a manifest and optional checksums.
pub struct ProjectFixture {
    pub dir: TempDir,
    pub manifest: PathBuf,
}

impl ProjectFixture {
    pub fn new(manifest: &ManifestFixture) -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp project")?;
        let manifest = manifest.write_to(dir.path())?;
        Ok(Self {
            dir,
            manifest,
        })
    }

    pub fn with_sum(self, content: &str) -> Result<Self> {
        fs::write(self.dir.path().join("go.sum"), content).context("Failed to write go.sum")?;
        Ok(self)
    }

    pub fn with_vendor(self) -> Result<Self> {
        fs::create_dir_all(self.dir.path().join("vendor")).context("Failed to create vendor dir")?;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}
