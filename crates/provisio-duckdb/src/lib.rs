//! Reference local target: a DuckDB database plus the install's files.

pub mod backend;
pub mod files;
pub mod options;
pub mod plugins;
pub mod schema;
pub mod sites;
pub mod users;

pub use backend::{DuckDbConnector, DuckDbTarget};
pub use files::{JsonConfigFile, LocalInstall};

/// Re-export the `duckdb` crate so tests can use
/// `provisio_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
