//! Find-references over the Symbol Store.
//!
//! Joins `references → symbols → documents`, filters by symbol name, and
//! orders by `(path, line)`. With `include_definition = false`, rows whose
//! role is `definition` are dropped in SQL.
//!
//! [`Lookup::NotFound`] means no symbol of that name exists. A symbol whose
//! only occurrence is its definition, queried without definitions, is found
//! with an empty list.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::Row;
use std::time::Instant;

use crate::config::Config;
use crate::models::{result_limit, symbol_name, Lookup, ReferenceRole, ReferenceSite, ToolError};
use crate::store::SymbolStore;
use crate::usage_log::UsageLog;

/// JSON body returned by the references tool.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReferencesResponse {
    Found {
        symbol: String,
        references: Vec<ReferenceSite>,
        count: usize,
    },
    Failed(ToolError),
}

impl ReferencesResponse {
    pub fn is_database_error(&self) -> bool {
        matches!(self, ReferencesResponse::Failed(e) if e.is_database_error())
    }
}

pub async fn find_references(
    store: &SymbolStore,
    name: &str,
    include_definition: bool,
    limit: Option<i64>,
) -> Result<Lookup<Vec<ReferenceSite>>> {
    let rows = sqlx::query(
        r#"
        SELECT d.relative_path AS file, r.line, r."column" AS col, r.end_line, r.end_column, r.role
        FROM "references" r
        JOIN symbols s ON s.id = r.symbol_id
        JOIN documents d ON d.id = r.document_id
        WHERE s.name = ?1 AND (?2 OR r.role <> 'definition')
        ORDER BY d.relative_path, r.line
        LIMIT ?3
        "#,
    )
    .bind(name)
    .bind(include_definition)
    .bind(limit.unwrap_or(-1))
    .fetch_all(store.pool())
    .await?;

    if rows.is_empty() && !symbol_exists(store, name).await? {
        return Ok(Lookup::NotFound);
    }

    let references = rows
        .iter()
        .map(|row| {
            let role: String = row.get("role");
            let role: ReferenceRole = role
                .parse()
                .with_context(|| format!("symbol index row for '{}'", name))?;
            Ok(ReferenceSite {
                file: row.get("file"),
                line: row.get("line"),
                column: row.get("col"),
                end_line: row.get("end_line"),
                end_column: row.get("end_column"),
                role,
                is_definition: role == ReferenceRole::Definition,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Lookup::Found(references))
}

async fn symbol_exists(store: &SymbolStore, name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM symbols WHERE name = ?)")
        .bind(name)
        .fetch_one(store.pool())
        .await?;
    Ok(exists)
}

/// Shape a lookup result for the tool boundary. Never fails.
pub fn to_response(name: &str, result: Result<Lookup<Vec<ReferenceSite>>>) -> ReferencesResponse {
    match result {
        Ok(Lookup::Found(references)) => ReferencesResponse::Found {
            symbol: name.to_string(),
            count: references.len(),
            references,
        },
        Ok(Lookup::NotFound) => ReferencesResponse::Failed(ToolError::symbol_not_found(name)),
        Err(e) => {
            log::warn!("reference lookup for '{}' failed: {:#}", name, e);
            ReferencesResponse::Failed(ToolError::database(&e))
        }
    }
}

pub async fn references_response(
    store: &SymbolStore,
    name: &str,
    include_definition: bool,
    limit: Option<i64>,
) -> ReferencesResponse {
    to_response(
        name,
        find_references(store, name, include_definition, limit).await,
    )
}

/// Run the refs command. Returns `false` only when the index could not be
/// read.
pub async fn run_references(
    config: &Config,
    name: &str,
    include_definition: bool,
    limit: Option<i64>,
) -> Result<bool> {
    let name = symbol_name(name)?;
    let limit = result_limit(limit)?;
    let started = Instant::now();
    let response = match SymbolStore::open(config).await {
        Ok(store) => {
            let response = references_response(&store, name, include_definition, limit).await;
            store.close().await;
            response
        }
        Err(e) => to_response(name, Err(e)),
    };

    let ok = !response.is_database_error();
    UsageLog::from_path(config.logging.usage_log.as_deref()).record(
        "find_references",
        ok,
        started.elapsed(),
    );
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    async fn found(store: &SymbolStore, name: &str, include_definition: bool) -> Vec<ReferenceSite> {
        match find_references(store, name, include_definition, None)
            .await
            .unwrap()
        {
            Lookup::Found(refs) => refs,
            Lookup::NotFound => panic!("expected '{}' to be found", name),
        }
    }

    #[tokio::test]
    async fn test_includes_definition_by_default() {
        let store = fixtures::store().await;
        let refs = found(&store, "useContacts", true).await;

        assert_eq!(refs.len(), 3);
        let lines: Vec<(&str, i64)> = refs.iter().map(|r| (r.file.as_str(), r.line)).collect();
        assert_eq!(
            lines,
            vec![
                ("src/contacts/ContactList.tsx", 3),
                ("src/contacts/ContactList.tsx", 14),
                ("src/hooks/useContacts.ts", 5),
            ]
        );
        let defs: Vec<&ReferenceSite> = refs.iter().filter(|r| r.is_definition).collect();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].role, ReferenceRole::Definition);
    }

    #[tokio::test]
    async fn test_exclude_definition() {
        let store = fixtures::store().await;
        let refs = found(&store, "useContacts", false).await;
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.role == ReferenceRole::Reference && !r.is_definition));
    }

    #[tokio::test]
    async fn test_definition_only_symbol_without_definition_is_empty() {
        let store = fixtures::store().await;
        let refs = found(&store, "lonely", false).await;
        assert!(refs.is_empty());

        let response = references_response(&store, "lonely", false, None).await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["count"], 0);
        assert_eq!(json["references"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_reference_in_other_document() {
        let store = fixtures::store().await;
        let refs = found(&store, "Contact", false).await;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].file, "src/hooks/useContacts.ts");
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = fixtures::store().await;
        let response = references_response(&store, "ghost", true, None).await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "Symbol not found");
        assert!(!response.is_database_error());
    }

    #[tokio::test]
    async fn test_found_payload_shape() {
        let store = fixtures::store().await;
        let response = references_response(&store, "validate", true, Some(2)).await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["symbol"], "validate");
        assert_eq!(json["count"], 2);
        assert_eq!(json["references"][0]["file"], "src/contacts/ContactList.tsx");
        assert_eq!(json["references"][0]["isDefinition"], false);
        assert_eq!(json["references"][0]["role"], "reference");
    }

    #[tokio::test]
    async fn test_unrecognized_role_is_database_error() {
        let store = fixtures::store().await;
        sqlx::query(
            r#"INSERT INTO "references" (symbol_id, document_id, line, "column", end_line, end_column, role)
               VALUES (2, 1, 99, 1, 99, 4, 'write')"#,
        )
        .execute(store.pool())
        .await
        .unwrap();

        let response = references_response(&store, "ContactList", true, None).await;
        assert!(response.is_database_error());
    }
}
