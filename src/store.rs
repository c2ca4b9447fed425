//! Read-only handle to the Symbol Store.
//!
//! A [`SymbolStore`] is opened once per process and passed explicitly to
//! every query. It wraps a bounded `sqlx` pool of read-only connections, so
//! the same handle can serve the sequential CLI and the concurrent HTTP
//! tool server.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::db;

#[derive(Clone)]
pub struct SymbolStore {
    pool: SqlitePool,
}

/// Counts reported by `cix stats`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub documents: i64,
    pub symbols: i64,
    pub references: i64,
    pub definitions: i64,
    pub symbols_by_kind: BTreeMap<String, i64>,
}

impl SymbolStore {
    /// Open the configured index read-only.
    pub async fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect_read_only(config).await?))
    }

    /// Handle whose connections open on first use. Errors from a missing
    /// or corrupt index surface on each query instead.
    pub fn open_lazy(config: &Config) -> Self {
        Self::new(db::read_only_lazy(config))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Release every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let symbols: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM symbols")
            .fetch_one(&self.pool)
            .await?;
        let references: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "references""#)
            .fetch_one(&self.pool)
            .await?;
        let definitions: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM "references" WHERE role = 'definition'"#)
                .fetch_one(&self.pool)
                .await?;

        let kind_rows =
            sqlx::query("SELECT kind, COUNT(*) AS n FROM symbols GROUP BY kind ORDER BY kind")
                .fetch_all(&self.pool)
                .await?;
        let symbols_by_kind = kind_rows
            .iter()
            .map(|row| (row.get::<String, _>("kind"), row.get::<i64, _>("n")))
            .collect();

        Ok(IndexStats {
            documents,
            symbols,
            references,
            definitions,
            symbols_by_kind,
        })
    }
}

/// Run the stats command: print index counts.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SymbolStore::open(config).await?;
    let stats = store.stats().await;
    store.close().await;
    let stats = stats?;

    println!("Symbol index: {}", config.db.path.display());
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Symbols:     {}", stats.symbols);
    println!("  References:  {}", stats.references);
    println!("  Definitions: {}", stats.definitions);
    if !stats.symbols_by_kind.is_empty() {
        println!();
        println!("  By kind:");
        for (kind, count) in &stats.symbols_by_kind {
            println!("    {:<12} {}", kind, count);
        }
    }

    Ok(())
}
