//! Go-to-definition over the Symbol Store.
//!
//! Looks up every symbol with a given name (optionally of one kind), joined
//! to its owning document and ordered by `(path, line)`. A name with no
//! matches is a normal [`Lookup::NotFound`]; storage failures become a
//! database-error payload in [`definition_response`].

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::Row;
use std::time::Instant;

use crate::config::Config;
use crate::models::{result_limit, symbol_name, DefinitionSite, Lookup, SymbolKind, ToolError};
use crate::store::SymbolStore;
use crate::usage_log::UsageLog;

/// JSON body returned by the definition tool.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DefinitionResponse {
    Found { definitions: Vec<DefinitionSite> },
    Failed(ToolError),
}

impl DefinitionResponse {
    pub fn is_database_error(&self) -> bool {
        matches!(self, DefinitionResponse::Failed(e) if e.is_database_error())
    }
}

pub async fn find_definitions(
    store: &SymbolStore,
    name: &str,
    kind: SymbolKind,
    limit: Option<i64>,
) -> Result<Lookup<Vec<DefinitionSite>>> {
    let rows = sqlx::query(
        r#"
        SELECT d.relative_path AS file, s.line, s."column" AS col, s.end_line, s.end_column,
               s.kind, s.documentation, s.signature
        FROM symbols s
        JOIN documents d ON d.id = s.document_id
        WHERE s.name = ?1 AND (?2 IS NULL OR s.kind = ?2)
        ORDER BY d.relative_path, s.line
        LIMIT ?3
        "#,
    )
    .bind(name)
    .bind(kind.as_filter())
    .bind(limit.unwrap_or(-1))
    .fetch_all(store.pool())
    .await?;

    if rows.is_empty() {
        return Ok(Lookup::NotFound);
    }

    let definitions = rows
        .iter()
        .map(|row| {
            let kind: String = row.get("kind");
            Ok(DefinitionSite {
                file: row.get("file"),
                line: row.get("line"),
                column: row.get("col"),
                end_line: row.get("end_line"),
                end_column: row.get("end_column"),
                kind: kind
                    .parse()
                    .with_context(|| format!("symbol index row for '{}'", name))?,
                documentation: row.get("documentation"),
                signature: row.get("signature"),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Lookup::Found(definitions))
}

/// Shape a lookup result for the tool boundary. Never fails.
pub fn to_response(name: &str, result: Result<Lookup<Vec<DefinitionSite>>>) -> DefinitionResponse {
    match result {
        Ok(Lookup::Found(definitions)) => DefinitionResponse::Found { definitions },
        Ok(Lookup::NotFound) => DefinitionResponse::Failed(ToolError::symbol_not_found(name)),
        Err(e) => {
            log::warn!("definition lookup for '{}' failed: {:#}", name, e);
            DefinitionResponse::Failed(ToolError::database(&e))
        }
    }
}

pub async fn definition_response(
    store: &SymbolStore,
    name: &str,
    kind: SymbolKind,
    limit: Option<i64>,
) -> DefinitionResponse {
    to_response(name, find_definitions(store, name, kind, limit).await)
}

/// Run the def command: print the JSON response. Returns `false` only when
/// the index could not be read; an empty name or a limit below 1 is an
/// error.
pub async fn run_definition(
    config: &Config,
    name: &str,
    kind: SymbolKind,
    limit: Option<i64>,
) -> Result<bool> {
    let name = symbol_name(name)?;
    let limit = result_limit(limit)?;
    let started = Instant::now();
    let response = match SymbolStore::open(config).await {
        Ok(store) => {
            let response = definition_response(&store, name, kind, limit).await;
            store.close().await;
            response
        }
        Err(e) => to_response(name, Err(e)),
    };

    let ok = !response.is_database_error();
    UsageLog::from_path(config.logging.usage_log.as_deref()).record(
        "go_to_definition",
        ok,
        started.elapsed(),
    );
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(ok)
}
