//! Global constants used throughout the modcache codebase.
//!
//! Timeouts, thresholds and the identifiers of the editor commands that
//! diagnostics can suggest.

use std::time::Duration;

/// Default timeout for one `go` command invocation (5 minutes).
///
/// `go list -u` contacts the module proxy for every dependency and can be
/// slow on large module graphs.
pub fn default_command_timeout() -> Duration {
    Duration::from_secs(300)
}

/// `go` invocations slower than this are reported on the `go::perf` target.
pub const SLOW_COMMAND_THRESHOLD: Duration = Duration::from_secs(1);

/// Identifier of the editor command that adds a dependency to a manifest.
pub const ADD_DEPENDENCY_COMMAND: &str = "gopls.add_dependency";

/// Title shown for the add-dependency command.
pub const ADD_DEPENDENCY_TITLE: &str = "Add dependency";

/// Separator between the explanation blocks printed by `go mod why`.
pub const WHY_BLOCK_SEPARATOR: &str = "\n\n";

/// Name of the directory whose presence forces `-mod=readonly` on listing.
pub const VENDOR_DIR: &str = "vendor";

/// Name of the configuration directory under the user's home directory.
pub const CONFIG_DIR_NAME: &str = ".modcache";

/// Environment variable overriding the `go` binary.
pub const GO_BINARY_ENV: &str = "MODCACHE_GO";

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "MODCACHE_CONFIG";
