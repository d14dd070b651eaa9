//! Integration tests for the IEEE 2030.5 server
//!
//! These tests exercise the crates together:
//! - configuration loading and resource initialization (`sepd`)
//! - the resource tree and mirror usage points (`sep-store`)
//! - control activation driven by ticks (`sep-control`)
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p sep-tests
//! ```
//!
//! # Test Structure
//!
//! - `lifecycle_test.rs` - config to init to control activation and completion
//! - `persistence_test.rs` - file-backed snapshots and certificate fingerprints
//! - `usage_point_test.rs` - mirror usage points and meter readings

// This crate only contains tests, no library code
