//! Directory adapters and startup wiring.

use std::sync::Arc;

use anyhow::{Context, Result};

use fieldhand_auth::{Directory, InMemoryDirectory};

use crate::config::AppConfig;

mod postgres;

pub use postgres::PostgresDirectory;

/// The directory handle shared by every request handler.
pub type SharedDirectory = Arc<dyn Directory>;

/// Open the configured directory.
///
/// With a `DATABASE_URL` this connects, applies the schema and returns the
/// Postgres directory. Without one it falls back to an empty in-memory
/// directory, which loses everything on restart.
pub async fn open_directory(config: &AppConfig) -> Result<SharedDirectory> {
    match &config.database_url {
        Some(url) => {
            let directory = PostgresDirectory::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to Postgres")?;
            directory
                .migrate()
                .await
                .context("failed to apply directory schema")?;
            tracing::info!(max_connections = config.db_max_connections, "using postgres directory");
            Ok(Arc::new(directory))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory directory (data is not persisted)");
            Ok(Arc::new(InMemoryDirectory::new()))
        }
    }
}
