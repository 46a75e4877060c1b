//! Module paths, versions and their validation rules.
//!
//! [`check`] applies the rules the module system uses for a `path@version`
//! pair: a well-formed module path, a canonical semantic version prefixed
//! with `v`, and agreement between a `/vN` path suffix and the version's
//! major number.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Suffix of the placeholder version given to the synthetic workspace
/// module. It never names a published release.
pub const WORKSPACE_MODULE_VERSION: &str = "v0.0.0-workspace";

/// One release of one module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleVersion {
    pub path: String,
    /// Empty for the unversioned left-hand side of a `replace`.
    pub version: String,
}

impl ModuleVersion {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}@{}", self.path, self.version)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("malformed module path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("version {version:?} invalid: should be {expected}, not {major}")]
    MajorMismatch { version: String, expected: String, major: String },
}

/// Reports whether `version` is the synthetic workspace placeholder.
pub fn is_workspace_module_version(version: &str) -> bool {
    version.ends_with(WORKSPACE_MODULE_VERSION)
}

/// Validates a `path@version` pair.
pub fn check(path: &str, version: &str) -> Result<(), ModuleError> {
    check_path(path)?;
    check_version(version)?;
    let (_, path_major) = split_path_version(path);
    check_path_major(version, path_major)
}

fn invalid_path(path: &str, reason: &str) -> ModuleError {
    ModuleError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Validates a module path.
pub fn check_path(path: &str) -> Result<(), ModuleError> {
    if path.is_empty() {
        return Err(invalid_path(path, "empty string"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(invalid_path(path, "leading or trailing slash"));
    }
    if path.starts_with('-') {
        return Err(invalid_path(path, "leading dash"));
    }

    let mut elements = path.split('/');
    let first = elements.next().unwrap_or_default();
    check_element(path, first)?;
    if !first.contains('.') {
        return Err(invalid_path(path, "missing dot in first path element"));
    }
    if let Some(c) = first
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.'))
    {
        return Err(invalid_path(path, &format!("invalid char {c:?} in first path element")));
    }
    for element in elements {
        check_element(path, element)?;
    }
    Ok(())
}

fn check_element(path: &str, element: &str) -> Result<(), ModuleError> {
    if element.is_empty() {
        return Err(invalid_path(path, "double slash"));
    }
    if element.starts_with('.') || element.ends_with('.') {
        return Err(invalid_path(path, "path element cannot begin or end with a dot"));
    }
    if let Some(c) = element
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')))
    {
        return Err(invalid_path(path, &format!("invalid char {c:?}")));
    }
    Ok(())
}

/// Validates that `version` is a canonical `v`-prefixed semantic version.
/// The only build metadata allowed is `+incompatible`.
pub fn check_version(version: &str) -> Result<semver::Version, ModuleError> {
    let invalid = |reason: &str| ModuleError::InvalidVersion {
        version: version.to_string(),
        reason: reason.to_string(),
    };
    let Some(rest) = version.strip_prefix('v') else {
        return Err(invalid("must start with \"v\""));
    };
    let parsed = semver::Version::parse(rest)
        .map_err(|e| invalid(&format!("not a canonical semantic version: {e}")))?;
    if !parsed.build.is_empty() && parsed.build.as_str() != "incompatible" {
        return Err(invalid("build metadata other than +incompatible is not allowed"));
    }
    Ok(parsed)
}

/// Splits a trailing `/vN` (N >= 2) or gopkg.in `.vN` suffix off a path.
pub fn split_path_version(path: &str) -> (&str, &str) {
    if path.starts_with("gopkg.in/") {
        if let Some(dot) = path.rfind(".v") {
            let digits = &path[dot + 2..];
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return (&path[..dot], &path[dot..]);
            }
        }
        return (path, "");
    }
    if let Some(slash) = path.rfind("/v") {
        let digits = &path[slash + 2..];
        let is_major = !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0')
            && digits != "1";
        if is_major {
            return (&path[..slash], &path[slash..]);
        }
    }
    (path, "")
}

fn check_path_major(version: &str, path_major: &str) -> Result<(), ModuleError> {
    let parsed = check_version(version)?;
    let major = format!("v{}", parsed.major);

    if version.starts_with("v0.0.0-") && path_major == ".v1" {
        return Ok(());
    }
    let expected = if path_major.is_empty() {
        if parsed.major <= 1 || parsed.build.as_str() == "incompatible" {
            return Ok(());
        }
        "v0 or v1".to_string()
    } else {
        let wanted = &path_major[1..];
        if major == wanted {
            return Ok(());
        }
        wanted.to_string()
    };
    Err(ModuleError::MajorMismatch {
        version: version.to_string(),
        expected,
        major,
    })
}
