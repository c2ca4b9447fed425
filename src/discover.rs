//! Artifact commands: `cix check`, `cix stamp`, and `cix plan`.
//!
//! Each configured artifact names its source globs and where its envelope
//! lives. `check` compares current source hashes against every envelope,
//! `stamp` wraps an externally generated payload into a fresh envelope, and
//! `plan` reports which chunks of a chunked artifact need rebuilding.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{ArtifactConfig, Config};
use crate::envelope::{build_source_hashes, write_atomic, write_chunked, ChunkedOutput, DiscoveryEnvelope};
use crate::sources::{chunk_name_for, enumerate_sources};
use crate::staleness::{check_artifact, stale_chunks, ChunkPlan, Staleness};

/// Changed files listed per stale artifact before eliding the rest.
const MAX_LISTED_CHANGES: usize = 5;

/// Freshness of one artifact, in the shape the check tool returns.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactReport {
    pub artifact: String,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub changed: Vec<String>,
}

/// Current sources of an artifact with their hashes.
struct SourceSnapshot {
    paths: Vec<String>,
    hashes: BTreeMap<String, String>,
}

fn snapshot(config: &Config, artifact: &ArtifactConfig) -> Result<SourceSnapshot> {
    let root = &config.discovery.root;
    let paths = enumerate_sources(root, artifact)?;
    let hashes = build_source_hashes(root, &paths);
    Ok(SourceSnapshot { paths, hashes })
}

pub fn artifact_report(config: &Config, name: &str) -> Result<ArtifactReport> {
    let artifact = config.artifact(name)?;
    let sources = snapshot(config, artifact)?;
    let report = match check_artifact(&config.discovery.state_dir, artifact, &sources.hashes) {
        Staleness::Fresh => ArtifactReport {
            artifact: name.to_string(),
            stale: false,
            reason: None,
            changed: Vec::new(),
        },
        Staleness::Stale { reason, changed } => ArtifactReport {
            artifact: name.to_string(),
            stale: true,
            reason: Some(reason.to_string()),
            changed: changed.iter().map(ToString::to_string).collect(),
        },
    };
    Ok(report)
}

/// Resolve `--only` against the configured artifacts, preserving the
/// configured order.
fn selected<'a>(config: &'a Config, only: &[String]) -> Result<Vec<&'a str>> {
    for name in only {
        config.artifact(name)?;
    }
    Ok(config
        .artifacts
        .keys()
        .map(String::as_str)
        .filter(|name| only.is_empty() || only.iter().any(|o| o == name))
        .collect())
}

/// Run the check command. Returns `true` when every checked artifact is
/// fresh.
pub fn run_check(config: &Config, only: &[String]) -> Result<bool> {
    let names = selected(config, only)?;
    if names.is_empty() {
        println!("No artifacts configured.");
        return Ok(true);
    }

    let mut stale_count = 0;
    for name in names {
        let report = artifact_report(config, name)?;
        if !report.stale {
            println!("✓ {}: fresh", name);
            continue;
        }

        stale_count += 1;
        println!(
            "✗ {}: STALE ({})",
            name,
            report.reason.as_deref().unwrap_or("unknown")
        );
        for change in report.changed.iter().take(MAX_LISTED_CHANGES) {
            println!("    {}", change);
        }
        if report.changed.len() > MAX_LISTED_CHANGES {
            println!("    ... and {} more", report.changed.len() - MAX_LISTED_CHANGES);
        }
    }

    if stale_count > 0 {
        println!();
        println!("{} artifact(s) need regeneration.", stale_count);
    }
    Ok(stale_count == 0)
}

fn read_payload(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read payload {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse payload {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("payload {} must be a JSON object", path.display()),
    }
}

fn take_summary(payload: &mut Map<String, Value>) -> Result<BTreeMap<String, i64>> {
    let Some(summary) = payload.remove("summary") else {
        return Ok(BTreeMap::new());
    };
    let Value::Object(entries) = summary else {
        bail!("payload 'summary' must be an object of counts");
    };

    let mut counts = BTreeMap::new();
    for (key, value) in entries {
        match value.as_i64() {
            Some(n) => {
                counts.insert(key, n);
            }
            None => log::warn!("summary '{}' is not an integer count, skipping", key),
        }
    }
    Ok(counts)
}

fn take_chunks(payload: &mut Map<String, Value>) -> Result<BTreeMap<String, Vec<Value>>> {
    let Some(Value::Object(chunks)) = payload.remove("chunks") else {
        bail!("chunked artifacts need a 'chunks' object of name -> [items] in the payload");
    };

    let mut out = BTreeMap::new();
    for (name, items) in chunks {
        let Value::Array(items) = items else {
            bail!("chunk '{}' must be an array of items", name);
        };
        out.insert(name, items);
    }
    Ok(out)
}

/// Run the stamp command: wrap `payload_path` into the envelope (or
/// chunked manifest) for `name`. Returns the path written.
pub fn run_stamp(config: &Config, name: &str, payload_path: &Path) -> Result<PathBuf> {
    let artifact = config.artifact(name)?;
    let sources = snapshot(config, artifact)?;
    let mut payload = read_payload(payload_path)?;
    let mut summary = take_summary(&mut payload)?;
    let target = config.discovery.state_dir.join(&artifact.output);

    if artifact.chunked {
        let chunks = take_chunks(&mut payload)?;
        if !payload.is_empty() {
            let ignored: Vec<&str> = payload.keys().map(String::as_str).collect();
            log::warn!("ignoring top-level payload keys for chunked artifact: {}", ignored.join(", "));
        }

        summary
            .entry("chunk_count".to_string())
            .or_insert(chunks.len() as i64);
        summary
            .entry("total_items".to_string())
            .or_insert(chunks.values().map(|items| items.len() as i64).sum());

        let file_to_chunk = sources
            .paths
            .iter()
            .map(|p| (p.clone(), chunk_name_for(p, artifact.chunk_segment)))
            .collect();

        let manifest = write_chunked(
            &target,
            ChunkedOutput {
                generator: &artifact.generator,
                source_globs: &artifact.include_globs,
                source_hashes: sources.hashes,
                summary,
                chunks,
                file_to_chunk,
            },
        )?;
        println!(
            "Wrote {} ({} chunks, {} source files)",
            target.display(),
            manifest.chunks.len(),
            manifest.source_hashes.len()
        );
    } else {
        let envelope = DiscoveryEnvelope::create(
            &artifact.generator,
            &artifact.include_globs,
            sources.hashes,
            summary,
            payload,
        )?;
        write_atomic(&target, &envelope)?;
        println!(
            "Wrote {} ({} source files, checksum {})",
            target.display(),
            envelope.source_hashes.len(),
            envelope.checksum
        );
    }

    Ok(target)
}

pub fn plan_artifact(config: &Config, name: &str) -> Result<ChunkPlan> {
    let artifact = config.artifact(name)?;
    if !artifact.chunked {
        bail!("artifact '{}' is not chunked; use `cix check` instead", name);
    }
    let sources = snapshot(config, artifact)?;
    let segment = artifact.chunk_segment;
    Ok(stale_chunks(
        &config.discovery.state_dir.join(&artifact.output),
        &sources.hashes,
        |path| Some(chunk_name_for(path, segment)),
    ))
}

/// Run the plan command: print the incremental rebuild plan as JSON.
pub fn run_plan(config: &Config, name: &str) -> Result<()> {
    let plan = plan_artifact(config, name)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
