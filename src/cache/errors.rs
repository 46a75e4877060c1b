//! Turns free-text errors from the manifest parser and the `go` command into
//! positioned diagnostics.
//!
//! Extraction is layered, strictest first:
//!
//! 1. [`extract_positioned`]: the text starts with `<path>:<line>[:<col>]: `.
//!    The position is mapped against the named file's content; if the file
//!    cannot be read or the position is out of range there is no diagnostic.
//! 2. [`Snapshot::match_dependency_in_error`]: the text mentions a
//!    `<path>@<version>` token. The diagnostic is attached to the manifest
//!    statement that declares it, searched in [`DECLARATION_PRECEDENCE`]
//!    order.
//!
//! [`Snapshot::extract_go_command_errors`] runs the second strategy only
//! when the first finds nothing. Finding nothing is not an error: the caller
//! falls back to showing the raw text.

use super::{ResolvingSource, Snapshot};
use crate::diagnostic::{
    Diagnostic, DiagnosticCategory, DiagnosticKind, SuggestedFix, add_dependency_command,
};
use crate::modfile::module::{self, is_workspace_module_version};
use crate::modfile::{Line, ModFile, ModuleVersion};
use crate::source::{FileHandle, FileSource};
use crate::span::{ColumnMapper, SourceRange, Uri, parse_position};
use regex::Regex;
use std::sync::Arc;

/// Marker the tool prints when a module is missing and downloads are off.
const GOPROXY_OFF: &str = "disabled by GOPROXY=off";

/// Marker of the tool's "run go get ... to add it" hint.
const TO_ADD_IT: &str = "to add it";

/// A `<path>:<line>[:<col>]: <message>` prefix split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPosition {
    pub path: String,
    pub line: u32,
    pub column: Option<u32>,
    pub message: String,
}

/// Parses the position prefix of `raw`, if it has one.
pub fn parse_error_position(raw: &str) -> Option<ErrorPosition> {
    let re = Regex::new(r"(?P<pos>.*:([\d]+)(:([\d]+))?): (?P<msg>.+)").ok()?;
    let captures = re.captures(raw.trim())?;
    let position = parse_position(captures.name("pos")?.as_str())?;
    Some(ErrorPosition {
        path: position.path,
        line: position.line,
        column: position.column,
        message: captures.name("msg")?.as_str().to_string(),
    })
}

/// A diagnostic at the position named by `raw`, mapped against the content
/// `source` serves for that path.
pub async fn extract_positioned(raw: &str, source: &dyn FileSource) -> Option<Diagnostic> {
    let position = parse_error_position(raw)?;
    let file = source.get_file(&Uri::from_path(&position.path)).await.ok()?;
    let content = file.read().ok()?;
    let mapper = ColumnMapper::new(file.uri().clone(), content);
    let Some(range) = mapper.range(position.line, position.column) else {
        tracing::debug!(
            target: "cache",
            "{}:{} is outside {}",
            position.line,
            position.column.unwrap_or(1),
            file.uri()
        );
        return None;
    };
    Some(Diagnostic::new(
        DiagnosticCategory::Syntax,
        DiagnosticKind::ParseError,
        file.uri().clone(),
        range,
        position.message,
    ))
}

/// The first valid, non-placeholder `path@version` token in `raw`.
///
/// Tokens are split on whitespace and colons, so
/// `example.com@v1.2.2: reading ...` yields `example.com@v1.2.2`.
pub fn find_module_version(raw: &str) -> Option<ModuleVersion> {
    let re = Regex::new(r"^(.*)@(.*)$").ok()?;
    raw.split(|c: char| c.is_whitespace() || c == ':')
        .filter(|token| !token.is_empty())
        .find_map(|token| {
            let captures = re.captures(token)?;
            let (path, version) = (captures.get(1)?.as_str(), captures.get(2)?.as_str());
            if is_workspace_module_version(version) {
                return None;
            }
            module::check(path, version).ok()?;
            Some(ModuleVersion::new(path, version))
        })
}

/// Kinds of manifest statement a dependency error can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Require,
    Exclude,
    Replace,
    Module,
}

/// Search order for [`find_declaration`]. The module statement matches any
/// dependency and comes last.
pub const DECLARATION_PRECEDENCE: [StatementKind; 4] = [
    StatementKind::Require,
    StatementKind::Exclude,
    StatementKind::Replace,
    StatementKind::Module,
];

/// The statement of `file` that declares `dependency`.
///
/// A replacement matches when either side equals `dependency`.
pub fn find_declaration<'a>(
    file: &'a ModFile,
    dependency: &ModuleVersion,
) -> Option<(StatementKind, &'a Line)> {
    DECLARATION_PRECEDENCE.iter().find_map(|kind| {
        let line = match kind {
            StatementKind::Require => {
                file.require.iter().find(|r| r.module == *dependency).map(|r| &r.syntax)
            }
            StatementKind::Exclude => {
                file.exclude.iter().find(|e| e.module == *dependency).map(|e| &e.syntax)
            }
            StatementKind::Replace => file
                .replace
                .iter()
                .find(|r| r.old == *dependency || r.new == *dependency)
                .map(|r| &r.syntax),
            StatementKind::Module => file.module.as_ref().map(|m| &m.syntax),
        };
        line.map(|line| (*kind, line))
    })
}

fn dependency_diagnostic(
    uri: &Uri,
    range: SourceRange,
    dependency: &ModuleVersion,
    raw: &str,
) -> Diagnostic {
    let offline = raw.contains(GOPROXY_OFF);
    let message = if offline {
        format!("{dependency} has not been downloaded")
    } else {
        raw.trim().to_string()
    };
    let diagnostic = Diagnostic::new(
        DiagnosticCategory::ToolError,
        DiagnosticKind::ListError,
        uri.clone(),
        range,
        message,
    );
    if !offline && !raw.contains(TO_ADD_IT) {
        return diagnostic;
    }
    let dependency = dependency.to_string();
    diagnostic.with_fix(SuggestedFix {
        title: format!("Download {dependency}"),
        command: Some(add_dependency_command(uri, false, &[dependency])),
    })
}

impl Snapshot {
    /// A diagnostic on the manifest statement declaring the dependency named
    /// in `raw`.
    ///
    /// Nothing is returned when no token names a valid dependency, the
    /// manifest does not parse, or it has no statement to attach to.
    pub async fn match_dependency_in_error(
        self: &Arc<Self>,
        fh: &Arc<dyn FileHandle>,
        raw: &str,
    ) -> Option<Diagnostic> {
        let dependency = find_module_version(raw)?;
        let parsed = self.parse_manifest(fh).await.ok()?;
        let (kind, line) = find_declaration(&parsed.file, &dependency)?;
        let range = parsed.range(line)?;
        tracing::debug!(target: "cache", "{} matched {:?} statement in {}", dependency, kind, fh.uri());
        Some(dependency_diagnostic(fh.uri(), range, &dependency, raw))
    }

    /// Diagnostics for an error the `go` command reported while working on
    /// the manifest `fh`. A positioned match wins; dependency matching is the
    /// fallback.
    pub async fn extract_go_command_errors(
        self: &Arc<Self>,
        fh: &Arc<dyn FileHandle>,
        raw: &str,
    ) -> Vec<Diagnostic> {
        let fallback: Arc<dyn FileSource> = Arc::clone(self) as Arc<dyn FileSource>;
        let source = ResolvingSource::for_file(fh, fallback);
        if let Some(diagnostic) = extract_positioned(raw, &source).await {
            return vec![diagnostic];
        }
        self.match_dependency_in_error(fh, raw).await.into_iter().collect()
    }
}
