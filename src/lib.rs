//! bimgit library crate: configuration and logging setup shared by the
//! `bimgit` binary and its integration tests.
//!
//! The engine itself lives in `bimgit-core` (re-exported here as
//! [`engine`]) on top of the storage layer in `bimgit-store`.

pub mod config;
pub mod telemetry;

pub use bimgit_core as engine;
pub use bimgit_store as store;

pub use config::{BimgitConfig, ConfigError};
