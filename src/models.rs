//! Core data types shared by the query tools, rank fusion, and the tool
//! server.
//!
//! Symbol kinds and reference roles are stored as text by the external
//! indexer; they become closed enums here, and any value outside the known
//! set is rejected when a row is read.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a program entity. `Any` doubles as the "no filter" value for
/// definition lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Method,
    Property,
    #[default]
    Any,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 7] = [
        SymbolKind::Function,
        SymbolKind::Class,
        SymbolKind::Interface,
        SymbolKind::Type,
        SymbolKind::Method,
        SymbolKind::Property,
        SymbolKind::Any,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Any => "any",
        }
    }

    /// The kind to filter on, or `None` when every kind matches.
    pub fn as_filter(&self) -> Option<&'static str> {
        match self {
            SymbolKind::Any => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "function" => SymbolKind::Function,
            "class" => SymbolKind::Class,
            "interface" => SymbolKind::Interface,
            "type" => SymbolKind::Type,
            "method" => SymbolKind::Method,
            "property" => SymbolKind::Property,
            "any" | "unspecified" => SymbolKind::Any,
            other => bail!(
                "unrecognized symbol kind '{}': expected one of function, class, interface, type, method, property, any",
                other
            ),
        })
    }
}

/// Role of one occurrence of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceRole {
    Definition,
    Reference,
}

impl ReferenceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceRole::Definition => "definition",
            ReferenceRole::Reference => "reference",
        }
    }
}

impl fmt::Display for ReferenceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "definition" => Ok(ReferenceRole::Definition),
            "reference" => Ok(ReferenceRole::Reference),
            other => bail!(
                "unrecognized reference role '{}': expected definition or reference",
                other
            ),
        }
    }
}

/// One definition site returned by `go_to_definition`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionSite {
    pub file: String,
    pub line: i64,
    pub column: i64,
    pub end_line: i64,
    pub end_column: i64,
    pub kind: SymbolKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// One usage site returned by `find_references`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSite {
    pub file: String,
    pub line: i64,
    pub column: i64,
    pub end_line: i64,
    pub end_column: i64,
    pub role: ReferenceRole,
    pub is_definition: bool,
}

/// Outcome of a symbol lookup that reached the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

/// Error payload shared by every query tool.
///
/// Not-found and database failures use the same shape so callers can
/// branch on `error` alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolError {
    pub error: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub const SYMBOL_NOT_FOUND: &str = "Symbol not found";
pub const DATABASE_ERROR: &str = "Database error";

impl ToolError {
    pub fn symbol_not_found(name: &str) -> Self {
        Self {
            error: SYMBOL_NOT_FOUND.to_string(),
            suggestion: format!(
                "No indexed symbol named '{}'. Fall back to a fuzzy or content search (e.g. `rg -n '{}'`).",
                name, name
            ),
            details: None,
        }
    }

    pub fn database(err: &anyhow::Error) -> Self {
        Self {
            error: DATABASE_ERROR.to_string(),
            suggestion: "The symbol index could not be read. Regenerate it with the indexer, then retry."
                .to_string(),
            details: Some(format!("{:#}", err)),
        }
    }

    pub fn is_database_error(&self) -> bool {
        self.error == DATABASE_ERROR
    }
}

/// Trimmed symbol name for a query. Empty names are rejected.
pub fn symbol_name(raw: &str) -> Result<&str> {
    let name = raw.trim();
    if name.is_empty() {
        bail!("symbol must not be empty");
    }
    Ok(name)
}

/// Result cap for a query; `None` means unlimited.
pub fn result_limit(limit: Option<i64>) -> Result<Option<i64>> {
    match limit {
        Some(n) if n < 1 => bail!("limit must be >= 1, got {}", n),
        other => Ok(other),
    }
}

/// Upstream search method that surfaced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Lexical / exact-match search.
    #[serde(rename = "fts")]
    Lexical,
    /// Embedding / vector search.
    #[serde(rename = "vector")]
    Semantic,
}

/// One entry of an upstream ranked list. Its rank is its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file: String,
    pub line: i64,
    #[serde(default)]
    pub content: String,
}

impl SearchHit {
    pub fn new(file: impl Into<String>, line: i64, content: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            content: content.into(),
        }
    }

    /// Identity of a logical hit: `file:line`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

/// A fused result. `sources` lists every method that surfaced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub file: String,
    pub line: i64,
    pub content: String,
    pub score: f64,
    pub sources: Vec<Provenance>,
}
