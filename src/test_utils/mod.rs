//! Test utilities for modcache
//!
//! - [`init_test_logging`]: one-time tracing setup for tests
//! - [`ScriptedRunner`]: a [`GoRunner`] that replays canned output and
//!   records every invocation
//! - [`fixtures`]: sample `go.mod` / `go.sum` content and temporary projects
//!
//! # Example
//!
//! ```rust,no_run
//! use modcache::test_utils::ScriptedRunner;
//!
//! let runner = ScriptedRunner::new()
//!     .respond("list", "{\"Path\": \"example.com/app\"}")
//!     .fail("mod", "go: example.com@v1.2.2: module lookup disabled by GOPROXY=off");
//! assert_eq!(runner.call_count(), 0);
//! ```

pub mod fixtures;

pub use fixtures::{ManifestFixture, ProjectFixture};

use crate::core::ModError;
use crate::gocmd::{GoRunner, Invocation};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging
/// stays off.
///
/// ```bash
/// RUST_LOG=memoize=trace,cache=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// A [`GoRunner`] that answers by verb with canned output.
///
/// Unscripted verbs fail with a [`ModError::GoCommand`].
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, Result<String, String>>,
    delay: Duration,
    calls: AtomicUsize,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `verb` with `stdout`.
    pub fn respond(mut self, verb: &str, stdout: impl Into<String>) -> Self {
        self.responses.insert(verb.to_string(), Ok(stdout.into()));
        self
    }

    /// Fail `verb` with `stderr`.
    pub fn fail(mut self, verb: &str, stderr: impl Into<String>) -> Self {
        self.responses.insert(verb.to_string(), Err(stderr.into()));
        self
    }

    /// Sleep before answering, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every invocation received so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

impl GoRunner for ScriptedRunner {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<String, ModError>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.invocations.lock().unwrap().push(invocation.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.responses.get(&invocation.verb) {
                Some(Ok(stdout)) => Ok(stdout.clone()),
                Some(Err(stderr)) => Err(ModError::GoCommand {
                    verb: invocation.verb.clone(),
                    stderr: stderr.clone(),
                }),
                None => Err(ModError::GoCommand {
                    verb: invocation.verb.clone(),
                    stderr: format!("unexpected {}", invocation.describe()),
                }),
            }
        }
        .boxed()
    }
}
