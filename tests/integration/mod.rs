//! Integration test suite for modcache
//!
//! These tests drive the public API end to end: sessions and snapshots over an
//! overlay file source, with a scripted `go` runner standing in for the real
//! binary, plus the `modcache` binary itself against temporary projects.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! RUST_LOG=cache=debug cargo test --test integration -- --nocapture
//! ```
//!
//! # Test Organization
//!
//! - **cli**: the `modcache` binary, with a shell script posing as `go`
//! - **derived_cache**: single flight and key independence of why / upgrade
//! - **error_extraction**: mapping `go` errors onto manifest statements
//! - **snapshot_lifecycle**: handle inheritance across snapshots

mod common;

mod cli;
mod derived_cache;
mod error_extraction;
mod snapshot_lifecycle;
