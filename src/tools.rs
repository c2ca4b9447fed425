//! Tool trait, registry, and the built-in code-intelligence tools.
//!
//! Every tool exposes a JSON Schema for its parameters and runs against a
//! shared [`ToolContext`]. The HTTP server lists tools with
//! `GET /tools/list` and dispatches `POST /tools/{name}` through the same
//! registry.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ToolRegistry                 │
//! │  go_to_definition   find_references          │
//! │  fuse_results       check_staleness          │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!            run_server() → POST /tools/{name}
//! ```
//!
//! Query tools never fail on a missing symbol or a broken index: those
//! outcomes are ordinary JSON payloads. A tool returns `Err` only for bad
//! input it could not have rejected through its schema.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::definition::definition_response;
use crate::discover::artifact_report;
use crate::fusion::{fuse, RrfK};
use crate::models::{result_limit, symbol_name, SearchHit, SymbolKind};
use crate::references::references_response;
use crate::store::SymbolStore;

/// A tool that agents can discover and call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name, as in `POST /tools/{name}`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Built-in tools are tagged `"builtin": true` in the tool list.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema (`type: "object"`) describing the parameters.
    fn parameters_schema(&self) -> Value;

    /// Run with parameters already checked by [`validate_params`]. The
    /// returned value is wrapped as `{ "result": ... }`.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// What a tool can reach while it runs.
#[derive(Clone)]
pub struct ToolContext {
    config: Arc<Config>,
    store: SymbolStore,
}

impl ToolContext {
    pub fn new(config: Arc<Config>, store: SymbolStore) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Owned handle for work moved off the async runtime.
    pub fn shared_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub fn store(&self) -> &SymbolStore {
        &self.store
    }
}

/// Serializable tool info for the `/tools/list` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            builtin: tool.is_builtin(),
            parameters: tool.parameters_schema(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter validation
// ═══════════════════════════════════════════════════════════════════════

/// Check `params` against a tool schema: required fields, JSON types, and
/// enum membership. Absent properties with a `default` are filled in.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("parameters must be a JSON object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !params_obj.contains_key(*field) {
            bail!("missing required parameter: {}", field);
        }
    }

    let mut result = params_obj.clone();

    for (prop_name, prop_schema) in &properties {
        let Some(value) = params_obj.get(prop_name) else {
            if let Some(default) = prop_schema.get("default") {
                result.insert(prop_name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) {
            let type_ok = match expected_type {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !type_ok {
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    prop_name,
                    expected_type,
                    json_type_name(value)
                );
            }
        }

        if let Some(enum_values) = prop_schema.get("enum").and_then(|e| e.as_array()) {
            if !enum_values.contains(value) {
                let allowed: Vec<String> = enum_values.iter().map(|v| v.to_string()).collect();
                bail!(
                    "parameter '{}' must be one of [{}], got {}",
                    prop_name,
                    allowed.join(", "),
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn symbol_param(params: &Value) -> Result<&str> {
    symbol_name(params["symbol"].as_str().unwrap_or(""))
}

fn limit_param(params: &Value) -> Result<Option<i64>> {
    result_limit(params.get("limit").and_then(Value::as_i64))
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in tools
// ═══════════════════════════════════════════════════════════════════════

pub struct GoToDefinitionTool;

#[async_trait]
impl Tool for GoToDefinitionTool {
    fn name(&self) -> &str {
        "go_to_definition"
    }

    fn description(&self) -> &str {
        "Find where a symbol is defined"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        let kinds: Vec<&str> = SymbolKind::ALL.iter().map(SymbolKind::as_str).collect();
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Symbol name" },
                "kind": { "type": "string", "enum": kinds, "default": "any" },
                "limit": { "type": "integer", "description": "Max definitions" }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let symbol = symbol_param(&params)?;
        let kind: SymbolKind = params["kind"].as_str().unwrap_or("any").parse()?;
        let limit = limit_param(&params)?;

        let response = definition_response(ctx.store(), symbol, kind, limit).await;
        Ok(serde_json::to_value(&response)?)
    }
}

pub struct FindReferencesTool;

#[async_trait]
impl Tool for FindReferencesTool {
    fn name(&self) -> &str {
        "find_references"
    }

    fn description(&self) -> &str {
        "Find every usage of a symbol"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Symbol name" },
                "includeDefinition": { "type": "boolean", "default": true },
                "limit": { "type": "integer", "description": "Max references" }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let symbol = symbol_param(&params)?;
        let include_definition = params["includeDefinition"].as_bool().unwrap_or(true);
        let limit = limit_param(&params)?;

        let response = references_response(ctx.store(), symbol, include_definition, limit).await;
        Ok(serde_json::to_value(&response)?)
    }
}

pub struct FuseResultsTool;

#[async_trait]
impl Tool for FuseResultsTool {
    fn name(&self) -> &str {
        "fuse_results"
    }

    fn description(&self) -> &str {
        "Merge lexical and semantic result lists with reciprocal rank fusion"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        let hits = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "file": { "type": "string" },
                    "line": { "type": "integer" },
                    "content": { "type": "string" }
                },
                "required": ["file", "line"]
            }
        });
        json!({
            "type": "object",
            "properties": {
                "lexical": hits,
                "semantic": hits,
                "k": { "type": "number", "description": "RRF constant, > 0" },
                "limit": { "type": "integer", "description": "Max results, 0 for all" }
            },
            "required": ["lexical", "semantic"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let lexical: Vec<SearchHit> = serde_json::from_value(params["lexical"].clone())
            .context("invalid 'lexical' results")?;
        let semantic: Vec<SearchHit> = serde_json::from_value(params["semantic"].clone())
            .context("invalid 'semantic' results")?;

        let k = match params.get("k").and_then(Value::as_f64) {
            Some(k) => RrfK::new(k)?,
            None => ctx.config().rrf_k()?,
        };
        let limit = match params.get("limit").and_then(Value::as_i64) {
            Some(n) if n < 0 => bail!("limit must be >= 0, got {}", n),
            Some(n) => n as usize,
            None => ctx.config().retrieval.final_limit,
        };

        let results = fuse(&lexical, &semantic, k, limit);
        Ok(json!({ "results": results, "count": results.len() }))
    }
}

pub struct CheckStalenessTool;

#[async_trait]
impl Tool for CheckStalenessTool {
    fn name(&self) -> &str {
        "check_staleness"
    }

    fn description(&self) -> &str {
        "Report which generated artifacts are out of date with their sources"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "artifacts": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Artifact names; all configured artifacts when omitted"
                }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let config = ctx.config();
        let names: Vec<String> = match params.get("artifacts").and_then(Value::as_array) {
            Some(list) => list
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .context("invalid artifact name, expected a string")
                })
                .collect::<Result<_>>()?,
            None => config.artifacts.keys().cloned().collect(),
        };

        // walks the source tree and hashes every file
        let config = ctx.shared_config();
        let reports = tokio::task::spawn_blocking(move || {
            names
                .iter()
                .map(|name| artifact_report(&config, name))
                .collect::<Result<Vec<_>>>()
        })
        .await
        .context("staleness check task panicked")??;
        let stale = reports.iter().filter(|r| r.stale).count();

        Ok(json!({ "artifacts": reports, "stale": stale }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding the four built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GoToDefinitionTool));
        registry.register(Box::new(FindReferencesTool));
        registry.register(Box::new(FuseResultsTool));
        registry.register(Box::new(CheckStalenessTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn into_tools(self) -> Vec<Box<dyn Tool>> {
        self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    async fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(Config::minimal()), fixtures::store().await)
    }

    async fn call(name: &str, params: Value) -> Result<Value> {
        let registry = ToolRegistry::with_builtins();
        let tool = registry.find(name).unwrap();
        let params = validate_params(&tool.parameters_schema(), &params)?;
        tool.execute(params, &ctx().await).await
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins();
        let names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec!["go_to_definition", "find_references", "fuse_results", "check_staleness"]
        );
        assert!(registry.find("search").is_none());
        assert!(registry.tools().iter().all(|t| t.is_builtin()));
    }

    #[test]
    fn test_validate_required_and_defaults() {
        let schema = GoToDefinitionTool.parameters_schema();
        assert!(validate_params(&schema, &json!({})).is_err());

        let params = validate_params(&schema, &json!({"symbol": "useContacts"})).unwrap();
        assert_eq!(params["kind"], "any");
        assert!(params.get("limit").is_none());
    }

    #[test]
    fn test_validate_types_and_enums() {
        let schema = GoToDefinitionTool.parameters_schema();
        let err = validate_params(&schema, &json!({"symbol": 42})).unwrap_err();
        assert!(err.to_string().contains("must be of type 'string', got number"));

        let err = validate_params(&schema, &json!({"symbol": "x", "kind": "variable"})).unwrap_err();
        assert!(err.to_string().contains("must be one of"));

        assert!(validate_params(&schema, &json!("not an object")).is_err());
    }

    #[tokio::test]
    async fn test_definition_tool() {
        let result = call("go_to_definition", json!({"symbol": "validate", "kind": "method"}))
            .await
            .unwrap();
        assert_eq!(result["definitions"].as_array().unwrap().len(), 1);
        assert_eq!(result["definitions"][0]["kind"], "method");
    }

    #[tokio::test]
    async fn test_definition_tool_not_found_is_a_result() {
        let result = call("go_to_definition", json!({"symbol": "nothingHere"}))
            .await
            .unwrap();
        assert_eq!(result["error"], "Symbol not found");
    }

    #[tokio::test]
    async fn test_empty_symbol_rejected() {
        let err = call("find_references", json!({"symbol": "  "})).await.unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[tokio::test]
    async fn test_references_tool_excludes_definition() {
        let result = call(
            "find_references",
            json!({"symbol": "useContacts", "includeDefinition": false}),
        )
        .await
        .unwrap();
        assert_eq!(result["count"], 2);
        assert!(result["references"]
            .as_array()
            .unwrap()
            .iter()
            .all(|r| r["role"] == "reference"));
    }

    #[tokio::test]
    async fn test_fuse_tool() {
        let result = call(
            "fuse_results",
            json!({
                "lexical": [{"file": "a.ts", "line": 10, "content": "x"}],
                "semantic": [{"file": "a.ts", "line": 10}, {"file": "b.ts", "line": 1}]
            }),
        )
        .await
        .unwrap();

        assert_eq!(result["count"], 2);
        assert_eq!(result["results"][0]["file"], "a.ts");
        assert_eq!(result["results"][0]["sources"], json!(["fts", "vector"]));
        let score = result["results"][0]["score"].as_f64().unwrap();
        assert!((score - 2.0 / 61.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_fuse_tool_rejects_bad_k() {
        let err = call(
            "fuse_results",
            json!({"lexical": [], "semantic": [], "k": 0}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("must be"));
    }

    #[tokio::test]
    async fn test_fuse_tool_rejects_malformed_hits() {
        let err = call(
            "fuse_results",
            json!({"lexical": [{"path": "a.ts"}], "semantic": []}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("invalid 'lexical'"));
    }

    #[tokio::test]
    async fn test_staleness_tool_with_no_artifacts() {
        let result = call("check_staleness", json!({})).await.unwrap();
        assert_eq!(result["stale"], 0);
        assert_eq!(result["artifacts"], json!([]));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_staleness_tool_alongside_symbol_query() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("app");
        for i in 0..50 {
            let path = root.join(format!("src/forms/Form{}.tsx", i));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, format!("export const Form{} = () => null;", i)).unwrap();
        }

        let mut config = Config::minimal();
        config.discovery.root = root;
        config.discovery.state_dir = tmp.path().join("state");
        config.artifacts.insert(
            "forms".into(),
            crate::config::ArtifactConfig {
                output: "forms-inventory.json".into(),
                generator: "extract-forms".into(),
                include_globs: vec!["src/**/*Form*.tsx".into()],
                exclude_globs: vec![],
                chunked: false,
                chunk_segment: 2,
            },
        );
        let ctx = ToolContext::new(Arc::new(config), fixtures::store().await);

        let (staleness, definition) = tokio::join!(
            CheckStalenessTool.execute(json!({}), &ctx),
            GoToDefinitionTool.execute(json!({"symbol": "useContacts"}), &ctx),
        );

        let staleness = staleness.unwrap();
        assert_eq!(staleness["stale"], 1);
        assert_eq!(staleness["artifacts"][0]["artifact"], "forms");
        let definition = definition.unwrap();
        assert_eq!(definition["definitions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_staleness_tool_unknown_artifact() {
        let err = call("check_staleness", json!({"artifacts": ["forms"]}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown artifact"));
    }
}
