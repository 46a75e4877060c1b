//! Reader for `go.sum` checksum files.

use super::ModuleVersion;
use std::path::{Path, PathBuf};

/// One `<path> <version>[/go.mod] <hash>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumEntry {
    pub module: ModuleVersion,
    /// The hash covers only the module's `go.mod`, not its full tree.
    pub go_mod: bool,
    pub hash: String,
}

/// The checksum file that sits next to `manifest`: the same filename with a
/// trailing `.mod` replaced by `.sum`, or with `.sum` appended otherwise.
pub fn sum_filename(manifest: &Path) -> PathBuf {
    let Some(name) = manifest.file_name() else {
        return manifest.join("go.sum");
    };
    let name = name.to_string_lossy();
    let sum = match name.strip_suffix(".mod") {
        Some(stem) => format!("{stem}.sum"),
        None => format!("{name}.sum"),
    };
    manifest.with_file_name(sum)
}

/// Parses checksum file content. Blank and malformed lines are skipped.
pub fn parse_sum(content: &[u8]) -> Vec<SumEntry> {
    String::from_utf8_lossy(content)
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let (path, version, hash) = (fields.next()?, fields.next()?, fields.next()?);
            if fields.next().is_some() {
                return None;
            }
            let (version, go_mod) = match version.strip_suffix("/go.mod") {
                Some(version) => (version, true),
                None => (version, false),
            };
            Some(SumEntry {
                module: ModuleVersion::new(path, version),
                go_mod,
                hash: hash.to_string(),
            })
        })
        .collect()
}
