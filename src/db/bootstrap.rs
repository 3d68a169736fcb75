use thiserror::Error;
use tracing::{debug, info};

use crate::db::executor::QueryExecutor;
use crate::schema::pharmacy_schema;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to create schema: {0}")]
    DuckDb(#[from] duckdb::Error),
}

/// Creates the inventory and diagnostic tables if they are missing.
/// Existing tables and their rows are left alone; nothing is seeded.
pub fn bootstrap(executor: &QueryExecutor) -> Result<(), BootstrapError> {
    let conn = executor.connect()?;
    for statement in pharmacy_schema().to_ddl() {
        debug!("Bootstrap DDL: {}", statement);
        conn.execute_batch(&statement)?;
    }

    info!("Schema ready in {}", executor.db_path().display());
    Ok(())
}
