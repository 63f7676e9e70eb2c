//! Infrastructure layer: configuration and durable directory adapters.

pub mod config;
pub mod directory;

pub use config::AppConfig;
pub use directory::{open_directory, PostgresDirectory, SharedDirectory};
