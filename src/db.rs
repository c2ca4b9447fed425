//! SQLite connection management.
//!
//! Three ways in:
//!
//! - [`connect`] opens the index read-write, creating the file and its
//!   parent directories. Only `cix init` and test fixtures use it. It
//!   keeps the rollback journal so read-only readers never need to
//!   create WAL side files.
//! - [`connect_read_only`] opens an existing index for queries. It never
//!   creates a file, so a missing index surfaces as an error the query
//!   tools can report.
//! - [`read_only_lazy`] builds the same pool without touching the file.
//!   The tool server uses it so that a missing index fails per request
//!   instead of at startup.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}

fn read_only_options(config: &Config) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(&config.db.path)
        .read_only(true)
        .create_if_missing(false)
}

pub async fn connect_read_only(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if !db_path.exists() {
        anyhow::bail!("symbol index not found at {}", db_path.display());
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect_with(read_only_options(config))
        .await
        .with_context(|| format!("failed to open symbol index {}", db_path.display()))?;

    Ok(pool)
}

pub fn read_only_lazy(config: &Config) -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect_lazy_with(read_only_options(config))
}
