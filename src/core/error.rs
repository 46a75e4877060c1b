//! Error handling for modcache
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** ([`ModError`]) for everything the caches
//!    compute. These are `Clone`, because a failed computation is cached and
//!    handed to every caller that shares its memoization handle.
//! 2. **User-friendly messages** ([`ErrorContext`]) for the command-line
//!    binary, with a suggestion and details where one is known.
//!
//! Application code (configuration loading, the CLI) uses [`anyhow::Result`]
//! with `.context(...)`; [`user_friendly_error`] digs the [`ModError`] back
//! out of an [`anyhow::Error`] chain when rendering.
//!
//! # Examples
//!
//! ```rust,no_run
//! use modcache::core::{ModError, user_friendly_error};
//!
//! let error = ModError::GoNotFound { binary: "go".to_string() };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // colored error with suggestion
//! ```

use crate::diagnostic::Diagnostic;
use crate::memoize::MemoizeError;
use crate::span::Uri;
use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// The main error type for cache computations.
///
/// # Error Categories
///
/// - **Read errors**: [`Read`](Self::Read) when file content is unavailable
/// - **Grammar errors**: [`ManifestSyntax`](Self::ManifestSyntax), carrying any
///   diagnostic that could be positioned inside the manifest
/// - **Tool errors**: [`GoCommand`](Self::GoCommand),
///   [`GoCommandTimeout`](Self::GoCommandTimeout), [`GoNotFound`](Self::GoNotFound),
///   [`GoSpawn`](Self::GoSpawn)
/// - **Result-shape errors**: [`MismatchedWhyResults`](Self::MismatchedWhyResults),
///   [`DecodeUpgrade`](Self::DecodeUpgrade)
/// - **Framework errors**: [`Memoize`](Self::Memoize)
#[derive(Debug, Clone, Error)]
pub enum ModError {
    /// A derived-info operation was asked about a file that is not a `go.mod`.
    #[error("{uri} is not a go.mod file")]
    NotAManifest {
        /// The offending file
        uri: Uri,
    },

    /// File content could not be read.
    #[error("failed to read {}", path.display())]
    Read {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error, shared so that the error stays cloneable
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The manifest does not conform to the `go.mod` grammar.
    ///
    /// The message is the parser's raw `file:line[:col]: message` text.
    /// `diagnostics` holds at most one diagnostic recovered from it.
    #[error("{message}")]
    ManifestSyntax {
        /// Manifest that failed to parse
        uri: Uri,
        /// Raw parser message
        message: String,
        /// Diagnostics positioned inside the manifest
        diagnostics: Vec<Diagnostic>,
    },

    /// The `go` executable could not be found.
    #[error("go command not found: {binary}")]
    GoNotFound {
        /// Binary name or path that was tried
        binary: String,
    },

    /// The `go` process could not be started.
    #[error("failed to start go {verb}")]
    GoSpawn {
        /// Verb being run (`mod`, `list`, ...)
        verb: String,
        /// Underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The `go` process did not finish in time.
    #[error("go {verb} timed out after {seconds} seconds")]
    GoCommandTimeout {
        /// Verb being run
        verb: String,
        /// Timeout that elapsed
        seconds: u64,
    },

    /// The `go` process exited unsuccessfully.
    ///
    /// Displays as the raw stderr text so that it can be fed to the
    /// error-extraction functions unchanged.
    #[error("{stderr}")]
    GoCommand {
        /// Verb being run
        verb: String,
        /// Raw error output
        stderr: String,
    },

    /// `go mod why` produced a different number of explanation blocks than
    /// requirements were passed.
    #[error("mismatched number of results: got {got}, want {want}")]
    MismatchedWhyResults {
        /// Blocks found in the output
        got: usize,
        /// Requirements passed to the tool
        want: usize,
    },

    /// `go list -json` output could not be decoded.
    #[error("failed to decode go list output: {message}")]
    DecodeUpgrade {
        /// Decoder error
        message: String,
    },

    /// The memoization framework refused or lost the computation.
    #[error(transparent)]
    Memoize(#[from] MemoizeError),

    /// Configuration problems.
    #[error("configuration error: {message}")]
    Config {
        /// What is wrong
        message: String,
    },

    /// A handle resolved to a value of the wrong shape for its key.
    #[error("unexpected cached value for {key}")]
    UnexpectedValue {
        /// Debug rendering of the cache key
        key: String,
    },
}

impl ModError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Diagnostics attached to a grammar error, empty for every other kind.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::ManifestSyntax {
                diagnostics,
                ..
            } => diagnostics,
            _ => &[],
        }
    }
}

/// Error wrapper that adds user-friendly details and suggestions for display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Converts any error into an [`ErrorContext`] with suggestions for the
/// failure modes users can act on.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let message = error
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");

    let Some(mod_error) = error.downcast_ref::<ModError>() else {
        return ErrorContext::new(message);
    };

    match mod_error {
        ModError::GoNotFound {
            binary,
        } => ErrorContext::new(message)
            .with_suggestion(
                "Install Go from https://go.dev/dl/ or point `go_binary` in the config (or MODCACHE_GO) at an existing installation",
            )
            .with_details(format!("'{binary}' was not found in PATH")),
        ModError::GoCommandTimeout {
            ..
        } => ErrorContext::new(message).with_suggestion(
            "Increase `command_timeout_secs` in the config; slow module proxies can delay `go list -u`",
        ),
        ModError::NotAManifest {
            ..
        } => ErrorContext::new(message).with_suggestion("Pass the path to a go.mod file"),
        ModError::ManifestSyntax {
            diagnostics,
            ..
        } => {
            let ctx = ErrorContext::new(message)
                .with_suggestion("Fix the go.mod syntax error, then run the command again");
            match diagnostics.first() {
                Some(diagnostic) => ctx.with_details(format!(
                    "line {}, column {}: {}",
                    diagnostic.range.start.line, diagnostic.range.start.column, diagnostic.message
                )),
                None => ctx,
            }
        }
        ModError::Read {
            path,
            ..
        } => ErrorContext::new(message)
            .with_suggestion("Check that the file exists and is readable")
            .with_details(format!("path: {}", path.display())),
        ModError::MismatchedWhyResults {
            ..
        } => ErrorContext::new(message).with_details(
            "`go mod why` returned a different number of explanations than requirements were asked about",
        ),
        _ => ErrorContext::new(message),
    }
}
