//! Structured, source-positioned diagnostics.
//!
//! A [`Diagnostic`] is what the error-extraction functions in
//! [`crate::cache::errors`] build out of free-text `go` output. Its range is
//! only meaningful inside the file named by `uri`.
//!
//! Diagnostics serialize with camelCase field names so that they can be
//! handed to an editor protocol layer as is:
//!
//! ```json
//! {
//!   "category": "tool-error",
//!   "message": "example.com@v1.2.2 has not been downloaded",
//!   "range": {"start": {"line": 3, "column": 1, "offset": 20}, "end": {...}},
//!   "uri": "/work/go.mod",
//!   "kind": "listError",
//!   "suggestedFixes": [{"title": "Download example.com@v1.2.2", "command": {...}}]
//! }
//! ```

use crate::constants::{ADD_DEPENDENCY_COMMAND, ADD_DEPENDENCY_TITLE};
use crate::span::{SourceRange, Uri};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a diagnostic is a manifest grammar problem or a build/resolution
/// problem reported by the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCategory {
    #[serde(rename = "syntax")]
    Syntax,
    #[serde(rename = "tool-error")]
    ToolError,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::ToolError => write!(f, "tool-error"),
        }
    }
}

/// Where a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// The manifest failed to parse.
    ParseError,
    /// Dependency listing or resolution failed.
    ListError,
}

/// A machine-actionable editor command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub title: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedFix {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub message: String,
    pub range: SourceRange,
    pub uri: Uri,
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_fixes: Vec<SuggestedFix>,
}

impl Diagnostic {
    pub fn new(
        category: DiagnosticCategory,
        kind: DiagnosticKind,
        uri: Uri,
        range: SourceRange,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            range,
            uri,
            kind,
            suggested_fixes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_fix(mut self, fix: SuggestedFix) -> Self {
        self.suggested_fixes.push(fix);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} [{}]",
            self.uri, self.range.start.line, self.range.start.column, self.message, self.category
        )
    }
}

/// The add-dependency command for `uri`.
///
/// Arguments are `[uri, add_require, dependencies]`, with each dependency
/// written as `path@version`.
pub fn add_dependency_command(uri: &Uri, add_require: bool, dependencies: &[String]) -> Command {
    Command {
        title: ADD_DEPENDENCY_TITLE.to_string(),
        command: ADD_DEPENDENCY_COMMAND.to_string(),
        arguments: vec![
            serde_json::json!(uri),
            serde_json::json!(add_require),
            serde_json::json!(dependencies),
        ],
    }
}
