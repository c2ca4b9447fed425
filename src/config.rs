//! TOML configuration for `cix`.
//!
//! One file describes where the symbol index lives, how rank fusion is
//! tuned, where discovery artifacts are written, and which source globs
//! feed each artifact. See `config/cix.example.toml`.

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::fusion::RrfK;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".claude/state/symbols.sqlite")
}
fn default_max_connections() -> u32 {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// RRF damping constant. Validated to be positive at load time.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    /// Default cap on fused output; `0` disables truncation.
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_rrf_k() -> f64 {
    60.0
}
fn default_final_limit() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Root that all source paths in envelopes are relative to.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Directory holding envelopes and chunked manifests.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            state_dir: default_state_dir(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_state_dir() -> PathBuf {
    PathBuf::from(".claude/state")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// JSONL file receiving one record per tool invocation.
    #[serde(default)]
    pub usage_log: Option<PathBuf>,
}

/// A generated artifact whose freshness is tracked by an envelope.
#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactConfig {
    /// File name (single envelope) or directory name (chunked manifest)
    /// under `discovery.state_dir`.
    pub output: String,
    #[serde(default = "default_generator")]
    pub generator: String,
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub chunked: bool,
    /// Index of the path component that names a file's chunk
    /// (`src/atomic-crm/<feature>/...` → `2`). Files with fewer
    /// components fall into `_root`.
    #[serde(default = "default_chunk_segment")]
    pub chunk_segment: usize,
}

fn default_generator() -> String {
    "cix".to_string()
}
fn default_chunk_segment() -> usize {
    2
}

impl Config {
    /// Defaults only, for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig::default(),
            retrieval: RetrievalConfig::default(),
            discovery: DiscoveryConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            artifacts: BTreeMap::new(),
        }
    }

    pub fn rrf_k(&self) -> Result<RrfK> {
        RrfK::new(self.retrieval.rrf_k)
    }

    pub fn artifact(&self, name: &str) -> Result<&ArtifactConfig> {
        self.artifacts.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.artifacts.keys().map(String::as_str).collect();
            anyhow::anyhow!(
                "Unknown artifact: '{}'. Configured artifacts: [{}]",
                name,
                known.join(", ")
            )
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    config
        .rrf_k()
        .with_context(|| "retrieval.rrf_k is invalid")?;

    if config.db.max_connections == 0 {
        bail!("db.max_connections must be >= 1");
    }

    for (name, artifact) in &config.artifacts {
        if artifact.output.trim().is_empty() {
            bail!("artifacts.{}.output must not be empty", name);
        }
        if artifact.include_globs.is_empty() {
            bail!("artifacts.{}.include_globs must list at least one pattern", name);
        }
        for pattern in artifact.include_globs.iter().chain(&artifact.exclude_globs) {
            Glob::new(pattern)
                .with_context(|| format!("artifacts.{}: invalid glob '{}'", name, pattern))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.retrieval.rrf_k, 60.0);
        assert_eq!(config.retrieval.final_limit, 20);
        assert_eq!(config.db.max_connections, 4);
        assert!(config.artifacts.is_empty());
    }

    #[test]
    fn test_rejects_non_positive_k() {
        assert!(parse("[retrieval]\nrrf_k = 0.0\n").is_err());
        assert!(parse("[retrieval]\nrrf_k = -5.0\n").is_err());
    }

    #[test]
    fn test_artifact_table() {
        let config = parse(
            r#"
[artifacts.forms]
output = "forms-inventory.json"
generator = "extract-forms"
include_globs = ["src/**/*Form*.tsx"]
exclude_globs = ["**/__tests__/**"]
"#,
        )
        .unwrap();
        let forms = config.artifact("forms").unwrap();
        assert_eq!(forms.output, "forms-inventory.json");
        assert!(!forms.chunked);
        assert_eq!(forms.chunk_segment, 2);
        assert!(config.artifact("hooks").is_err());
    }

    #[test]
    fn test_rejects_artifact_without_globs() {
        let result = parse(
            r#"
[artifacts.forms]
output = "forms-inventory.json"
include_globs = []
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_bad_glob() {
        let result = parse(
            r#"
[artifacts.forms]
output = "forms.json"
include_globs = ["src/[.tsx"]
"#,
        );
        assert!(result.is_err());
    }
}
