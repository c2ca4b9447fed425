//! Integration tests for the HTTP tool server.
//!
//! Each test seeds a Symbol Store on disk, starts the server on a free
//! port, and talks to it over HTTP the way an editor or agent would.

use anyhow::Result;
use async_trait::async_trait;
use code_intel::config::Config;
use code_intel::db;
use code_intel::migrate::create_schema;
use code_intel::server::{run_server, run_server_with_extensions};
use code_intel::tools::{Tool, ToolContext, ToolRegistry};
use serde_json::{json, Value};
use tempfile::TempDir;

// ─── Test Tool ──────────────────────────────────────────────────────

/// Counts the symbols in the index through the shared store handle.
struct SymbolCountTool;

#[async_trait]
impl Tool for SymbolCountTool {
    fn name(&self) -> &str {
        "count_symbols"
    }

    fn description(&self) -> &str {
        "Count symbols in the index"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let stats = ctx.store().stats().await?;
        Ok(json!({ "symbols": stats.symbols }))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config_with_port(tmp: &TempDir, port: u16) -> Config {
    let root = tmp.path();
    let config_content = format!(
        r#"
[db]
path = "{root}/symbols.sqlite"
max_connections = 2

[retrieval]
rrf_k = 60.0
final_limit = 12

[discovery]
root = "{root}/app"
state_dir = "{root}/state"

[server]
bind = "127.0.0.1:{port}"

[logging]
usage_log = "{root}/state/tool-usage.jsonl"

[artifacts.forms]
output = "forms-inventory.json"
include_globs = ["src/**/*Form*.tsx"]
"#,
        root = root.display(),
        port = port
    );
    toml::from_str(&config_content).unwrap()
}

async fn seed(cfg: &Config) {
    let pool = db::connect(cfg).await.unwrap();
    create_schema(&pool).await.unwrap();
    for stmt in [
        "INSERT INTO documents (id, relative_path) VALUES (1, 'src/contacts/ContactList.tsx')",
        "INSERT INTO documents (id, relative_path) VALUES (2, 'src/hooks/useContacts.ts')",
        r#"INSERT INTO symbols (id, document_id, name, kind, line, "column", end_line, end_column, documentation)
           VALUES (1, 2, 'useContacts', 'function', 3, 17, 9, 2, 'Loads contacts.')"#,
        r#"INSERT INTO "references" (symbol_id, document_id, line, "column", end_line, end_column, role)
           VALUES (1, 2, 3, 17, 3, 28, 'definition')"#,
        r#"INSERT INTO "references" (symbol_id, document_id, line, "column", end_line, end_column, role)
           VALUES (1, 1, 8, 20, 8, 31, 'reference')"#,
    ] {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }
    pool.close().await;

    let form = cfg.discovery.root.join("src/contacts/ContactForm.tsx");
    std::fs::create_dir_all(form.parent().unwrap()).unwrap();
    std::fs::write(form, "export const ContactForm = () => null;\n").unwrap();
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn start(tmp: &TempDir, seeded: bool) -> (u16, Config, tokio::task::JoinHandle<()>) {
    let port = find_free_port();
    let cfg = test_config_with_port(tmp, port);
    if seeded {
        seed(&cfg).await;
    }

    let cfg_clone = cfg.clone();
    let handle = tokio::spawn(async move {
        run_server(&cfg_clone).await.ok();
    });
    wait_for_server(port).await;
    (port, cfg, handle)
}

async fn post(port: u16, tool: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/tools/{}", port, tool))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_tool_list() {
    let tmp = TempDir::new().unwrap();
    let (port, _cfg, handle) = start(&tmp, true).await;

    let body: Value = reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");

    let body: Value = reqwest::get(format!("http://127.0.0.1:{}/tools/list", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["go_to_definition", "find_references", "fuse_results", "check_staleness"]
    );
    assert_eq!(body["tools"][0]["builtin"], true);
    assert_eq!(body["tools"][0]["parameters"]["required"], json!(["symbol"]));

    handle.abort();
}

#[tokio::test]
async fn test_definition_and_references() {
    let tmp = TempDir::new().unwrap();
    let (port, _cfg, handle) = start(&tmp, true).await;

    let (status, body) = post(port, "go_to_definition", json!({"symbol": "useContacts"})).await;
    assert_eq!(status, 200);
    let defs = body["result"]["definitions"].as_array().unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0]["documentation"], "Loads contacts.");
    assert_eq!(defs[0]["endLine"], 9);

    let (status, body) = post(
        port,
        "find_references",
        json!({"symbol": "useContacts", "includeDefinition": false}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["count"], 1);
    assert_eq!(body["result"]["references"][0]["file"], "src/contacts/ContactList.tsx");

    handle.abort();
}

#[tokio::test]
async fn test_not_found_is_a_200_result() {
    let tmp = TempDir::new().unwrap();
    let (port, _cfg, handle) = start(&tmp, true).await;

    let (status, body) = post(port, "find_references", json!({"symbol": "ghost"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["error"], "Symbol not found");

    handle.abort();
}

#[tokio::test]
async fn test_missing_index_is_a_database_error_result() {
    let tmp = TempDir::new().unwrap();
    let (port, cfg, handle) = start(&tmp, false).await;

    let (status, body) = post(port, "go_to_definition", json!({"symbol": "useContacts"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["error"], "Database error");
    assert!(!cfg.db.path.exists());

    handle.abort();
}

#[tokio::test]
async fn test_request_errors() {
    let tmp = TempDir::new().unwrap();
    let (port, _cfg, handle) = start(&tmp, true).await;

    let (status, body) = post(port, "nonexistent", json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = post(port, "go_to_definition", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("missing required parameter: symbol"));

    let (status, _) = post(
        port,
        "go_to_definition",
        json!({"symbol": "useContacts", "kind": "variable"}),
    )
    .await;
    assert_eq!(status, 400);

    let (status, _) = post(port, "fuse_results", json!({"lexical": [], "semantic": [], "k": -1})).await;
    assert_eq!(status, 400);

    handle.abort();
}

#[tokio::test]
async fn test_fuse_and_staleness_tools() {
    let tmp = TempDir::new().unwrap();
    let (port, _cfg, handle) = start(&tmp, true).await;

    let (status, body) = post(
        port,
        "fuse_results",
        json!({
            "lexical": [{"file": "a.ts", "line": 1}, {"file": "b.ts", "line": 2}],
            "semantic": [{"file": "c.ts", "line": 3}, {"file": "a.ts", "line": 1}],
            "limit": 2
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["count"], 2);
    assert_eq!(body["result"]["results"][0]["file"], "a.ts");

    let (status, body) = post(port, "check_staleness", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["stale"], 1);
    assert_eq!(body["result"]["artifacts"][0]["artifact"], "forms");
    assert!(body["result"]["artifacts"][0]["reason"]
        .as_str()
        .unwrap()
        .contains("does not exist"));

    handle.abort();
}

#[tokio::test]
async fn test_usage_log_records_calls() {
    let tmp = TempDir::new().unwrap();
    let (port, cfg, handle) = start(&tmp, true).await;

    post(port, "go_to_definition", json!({"symbol": "useContacts"})).await;
    post(port, "go_to_definition", json!({})).await;

    let path = cfg.logging.usage_log.clone().unwrap();
    let lines: Vec<Value> = std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["ok"], true);
    assert_eq!(lines[1]["ok"], false);

    handle.abort();
}

#[tokio::test]
async fn test_extension_tool_via_http_server() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let cfg = test_config_with_port(&tmp, port);
    seed(&cfg).await;

    let mut tools = ToolRegistry::new();
    tools.register(Box::new(SymbolCountTool));

    let cfg_clone = cfg.clone();
    let handle = tokio::spawn(async move {
        run_server_with_extensions(&cfg_clone, tools).await.ok();
    });
    wait_for_server(port).await;

    let (status, body) = post(port, "count_symbols", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["symbols"], 1);

    let body: Value = reqwest::get(format!("http://127.0.0.1:{}/tools/list", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let custom = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "count_symbols")
        .expect("extension tool should be listed");
    assert_eq!(custom["builtin"], false);

    handle.abort();
}
