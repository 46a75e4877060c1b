//! Invocation of the `go` command.
//!
//! An [`Invocation`] describes one run of the tool: verb, arguments,
//! working directory, an optional `-mod=` flag, extra environment and a
//! [`RunMode`]. It is handed to a [`GoRunner`], which returns the raw
//! stdout on success or a [`ModError`] carrying the raw error text.
//!
//! [`ProcessRunner`] is the real implementation, spawning the binary with
//! `tokio::process`. Tests substitute a scripted runner.
//!
//! # Network access
//!
//! Invocations that do not allow network access run with `GOPROXY=off`, so
//! the tool fails fast (with a "disabled by GOPROXY=off" message) instead of
//! downloading a missing module.

use crate::constants::{SLOW_COMMAND_THRESHOLD, default_command_timeout};
use crate::core::ModError;
use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

/// Whether an invocation may reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunMode {
    pub allow_network: bool,
}

impl RunMode {
    pub const NORMAL: Self = Self {
        allow_network: false,
    };

    pub const ALLOW_NETWORK: Self = Self {
        allow_network: true,
    };
}

/// One run of the `go` command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Invocation {
    pub verb: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Value for `-mod=`, placed right after the verb.
    pub mod_flag: Option<String>,
    pub env: Vec<(String, String)>,
    pub run_mode: RunMode,
}

impl Invocation {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn mod_flag(mut self, flag: impl Into<String>) -> Self {
        self.mod_flag = Some(flag.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = mode;
        self
    }

    /// Arguments passed to the binary, verb first.
    pub fn command_line(&self) -> Vec<String> {
        let mut line = Vec::with_capacity(self.args.len() + 2);
        line.push(self.verb.clone());
        if let Some(flag) = &self.mod_flag {
            line.push(format!("-mod={flag}"));
        }
        line.extend(self.args.iter().cloned());
        line
    }

    /// Environment the process runs with on top of the inherited one.
    /// Later entries win.
    pub fn effective_env(&self) -> Vec<(String, String)> {
        let mut env = self.env.clone();
        if !self.run_mode.allow_network {
            env.push(("GOPROXY".to_string(), "off".to_string()));
        }
        env
    }

    /// `go <command line>`, for logs.
    pub fn describe(&self) -> String {
        format!("go {}", self.command_line().join(" "))
    }
}

/// Runs invocations.
pub trait GoRunner: Send + Sync {
    /// Returns stdout, or an error whose display is the raw error text.
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<String, ModError>>;
}

/// Runs the real binary as a subprocess.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    go_binary: String,
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new("go", default_command_timeout())
    }
}

impl ProcessRunner {
    pub fn new(go_binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            go_binary: go_binary.into(),
            timeout,
        }
    }

    pub fn go_binary(&self) -> &str {
        &self.go_binary
    }

    async fn execute(&self, invocation: &Invocation) -> Result<String, ModError> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.go_binary);
        cmd.args(invocation.command_line())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in invocation.effective_env() {
            tracing::trace!(target: "go", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }

        tracing::debug!(
            target: "go",
            "Executing command: {} (in {})",
            invocation.describe(),
            invocation.working_dir.as_deref().unwrap_or(Path::new(".")).display()
        );

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModError::GoNotFound {
                    binary: self.go_binary.clone(),
                });
            }
            Ok(Err(e)) => {
                return Err(ModError::GoSpawn {
                    verb: invocation.verb.clone(),
                    source: std::sync::Arc::new(e),
                });
            }
            Err(_) => {
                tracing::warn!(
                    target: "go",
                    "Command timed out after {} seconds: {}",
                    self.timeout.as_secs(),
                    invocation.describe()
                );
                return Err(ModError::GoCommandTimeout {
                    verb: invocation.verb.clone(),
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let elapsed = start.elapsed();
        if elapsed > SLOW_COMMAND_THRESHOLD {
            tracing::info!(target: "go::perf", "{} took {:.2}s", invocation.describe(), elapsed.as_secs_f64());
        } else {
            tracing::debug!(target: "go::perf", "{} took {}ms", invocation.describe(), elapsed.as_millis());
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(target: "go", "Command failed with exit code: {:?}", output.status.code());
            let text = if stderr.trim().is_empty() {
                stdout.trim_end()
            } else {
                stderr.trim_end()
            };
            return Err(ModError::GoCommand {
                verb: invocation.verb.clone(),
                stderr: text.to_string(),
            });
        }
        Ok(stdout)
    }
}

impl GoRunner for ProcessRunner {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<String, ModError>> {
        self.execute(invocation).boxed()
    }
}
