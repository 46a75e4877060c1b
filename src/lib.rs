//! modcache - memoized derived metadata for Go module manifests
//!
//! modcache parses `go.mod` files and derives two expensive facts from them,
//! why each requirement is needed and which modules have upgrades, by running
//! the `go` command at most once per distinct input. Errors the `go` command
//! prints are mapped back onto the manifest statements they concern, as
//! structured, positioned [`diagnostic::Diagnostic`]s.
//!
//! # Architecture Overview
//!
//! - Every cached fact is keyed by the content identity of the manifest it was
//!   computed from ([`source::FileIdentity`]), plus the session, view root and
//!   environment fingerprint for tool-derived facts.
//! - Concurrent requests for one key share a single computation
//!   ([`memoize::Handle`]); the result, success or failure, is kept until no
//!   snapshot holds the handle any more.
//! - Snapshots ([`cache::Snapshot`]) carry handles of unchanged files over to
//!   the next generation.
//!
//! # Core Modules
//!
//! - [`memoize`] - single-flight memoization handles, generations and the store
//! - [`cache`] - sessions, views, snapshots and the parse / why / upgrade caches
//! - [`cache::errors`] - mapping `go` error text onto manifest statements
//! - [`modfile`] - the `go.mod` / `go.sum` grammar
//! - [`gocmd`] - running the `go` command
//! - [`source`] - file handles, disk and overlay file sources
//! - [`span`] - URIs, positions and the column mapper
//! - [`diagnostic`] - diagnostic and suggested-fix types
//!
//! ## Supporting Modules
//! - [`config`] - `~/.modcache/config.toml`
//! - [`core`] - error types and user-facing error rendering
//! - [`cli`] - the `modcache` binary
//!
//! # Example
//!
//! ```rust,no_run
//! use modcache::cache::{Session, View};
//! use modcache::config::CacheConfig;
//! use modcache::source::DiskFileSource;
//! use modcache::span::Uri;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::load().await?;
//! let session = Session::new("editor", Arc::new(DiskFileSource), Arc::new(config.runner()));
//! let snapshot = session.new_snapshot(Arc::new(View::from_config("/work/app", &config)));
//!
//! let manifest = snapshot.get_file(&Uri::from_path("/work/app/go.mod")).await?;
//! match snapshot.mod_upgrade(&manifest).await {
//!     Ok(upgrades) => println!("{} upgrades", upgrades.len()),
//!     Err(modcache::core::ModError::GoCommand { stderr, .. }) => {
//!         for diagnostic in snapshot.extract_go_command_errors(&manifest, &stderr).await {
//!             println!("{diagnostic}");
//!         }
//!     }
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod diagnostic;
pub mod gocmd;
pub mod memoize;
pub mod modfile;
pub mod source;
pub mod span;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
