//! Discovery envelopes: the manifest written beside every generated
//! artifact.
//!
//! An envelope records the content hash of each source file the artifact
//! was built from, a summary, and a checksum over itself. The checksum is
//! computed with the `checksum` field blanked, so it is self-referential
//! but deterministic.
//!
//! Two layouts are supported:
//!
//! - a single JSON file (`forms-inventory.json`) holding the envelope with
//!   the payload flattened into it, and
//! - a chunked directory (`hooks-inventory/`) holding one file per chunk
//!   plus a `manifest.json` that lists the chunks and which source files
//!   feed each one.
//!
//! Every file is written atomically: serialize to `<file>.tmp`, then rename
//! over the final path.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Hash recorded for a file that vanished between discovery and hashing.
pub const MISSING_HASH: &str = "MISSING";

/// Name of the manifest inside a chunked artifact directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Envelope keys that a payload may not shadow.
const RESERVED_KEYS: [&str; 7] = [
    "status",
    "generated_at",
    "generator",
    "source_globs",
    "checksum",
    "source_hashes",
    "summary",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Complete,
    InProgress,
    Error,
}

/// Single-file envelope with the artifact payload flattened in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEnvelope {
    pub status: EnvelopeStatus,
    pub generated_at: String,
    pub generator: String,
    pub source_globs: Vec<String>,
    pub checksum: String,
    pub source_hashes: BTreeMap<String, String>,
    pub summary: BTreeMap<String, i64>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl DiscoveryEnvelope {
    /// Build a complete envelope and seal it with its checksum.
    pub fn create(
        generator: &str,
        source_globs: &[String],
        source_hashes: BTreeMap<String, String>,
        summary: BTreeMap<String, i64>,
        mut payload: Map<String, Value>,
    ) -> Result<Self> {
        for key in RESERVED_KEYS {
            if payload.remove(key).is_some() {
                log::debug!("dropping reserved key '{}' from payload", key);
            }
        }

        let mut envelope = Self {
            status: EnvelopeStatus::Complete,
            generated_at: now_iso(),
            generator: generator.to_string(),
            source_globs: source_globs.to_vec(),
            checksum: String::new(),
            source_hashes,
            summary,
            payload,
        };
        envelope.checksum = envelope.compute_checksum()?;
        Ok(envelope)
    }

    pub fn compute_checksum(&self) -> Result<String> {
        let blank = Self {
            checksum: String::new(),
            ..self.clone()
        };
        hash_payload(&blank)
    }

    pub fn verify_checksum(&self) -> Result<bool> {
        Ok(self.compute_checksum()? == self.checksum)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse envelope {}", path.display()))
    }
}

/// One chunk listed in a chunked manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub name: String,
    pub file: String,
    pub item_count: usize,
    pub checksum: String,
    /// Source files that contributed to this chunk.
    pub source_files: Vec<String>,
    pub source_hashes: BTreeMap<String, String>,
}

/// Manifest of a chunked artifact directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedManifest {
    pub status: EnvelopeStatus,
    pub generated_at: String,
    pub generator: String,
    pub source_globs: Vec<String>,
    pub checksum: String,
    pub source_hashes: BTreeMap<String, String>,
    pub summary: BTreeMap<String, i64>,
    pub chunks: Vec<ChunkInfo>,
    /// Source path → names of the chunks it contributes to.
    pub file_to_chunks: BTreeMap<String, Vec<String>>,
}

impl ChunkedManifest {
    pub fn compute_checksum(&self) -> Result<String> {
        let blank = Self {
            checksum: String::new(),
            ..self.clone()
        };
        hash_payload(&blank)
    }

    pub fn verify_checksum(&self) -> Result<bool> {
        Ok(self.compute_checksum()? == self.checksum)
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse manifest {}", path.display()))
    }
}

#[derive(Serialize)]
struct ChunkFile<'a> {
    chunk_name: &'a str,
    generated_at: &'a str,
    item_count: usize,
    items: &'a [Value],
}

/// Inputs for [`write_chunked`].
pub struct ChunkedOutput<'a> {
    pub generator: &'a str,
    pub source_globs: &'a [String],
    pub source_hashes: BTreeMap<String, String>,
    pub summary: BTreeMap<String, i64>,
    /// Chunk name → items.
    pub chunks: BTreeMap<String, Vec<Value>>,
    /// Source path → chunk it belongs to.
    pub file_to_chunk: BTreeMap<String, String>,
}

/// First 12 hex characters of the SHA-256 of a file's content.
pub fn hash_file(path: &Path) -> Result<String> {
    let content =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(hash_bytes(&content)[..12].to_string())
}

/// `sha256:` plus 16 hex characters of the SHA-256 of the compact JSON.
pub fn hash_payload<T: Serialize>(data: &T) -> Result<String> {
    let json = serde_json::to_string(data)?;
    Ok(format!("sha256:{}", &hash_bytes(json.as_bytes())[..16]))
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Map each relative path under `root` to its content hash. A file that
/// cannot be read is recorded as [`MISSING_HASH`] instead of failing the
/// batch.
pub fn build_source_hashes(root: &Path, relative_paths: &[String]) -> BTreeMap<String, String> {
    relative_paths
        .iter()
        .map(|rel| {
            let hash = hash_file(&root.join(rel)).unwrap_or_else(|e| {
                log::debug!("{}: recording as {}: {:#}", rel, MISSING_HASH, e);
                MISSING_HASH.to_string()
            });
            (rel.clone(), hash)
        })
        .collect()
}

/// Write `value` as pretty JSON to `path` without ever exposing a partial
/// file: the content goes to `<path>.tmp` first and is renamed into place.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let tmp = temp_path(path);
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| {
        format!("failed to move {} into place at {}", tmp.display(), path.display())
    })?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a chunked artifact: every chunk file, then the manifest.
pub fn write_chunked(dir: &Path, output: ChunkedOutput<'_>) -> Result<ChunkedManifest> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut file_to_chunks: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut chunk_to_files: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (file, chunk) in &output.file_to_chunk {
        file_to_chunks
            .entry(file.clone())
            .or_default()
            .push(chunk.clone());
        chunk_to_files
            .entry(chunk.as_str())
            .or_default()
            .push(file.clone());
    }

    let generated_at = now_iso();
    let mut chunks = Vec::with_capacity(output.chunks.len());

    for (name, items) in &output.chunks {
        let file = format!("{}.json", name);
        let chunk_file = ChunkFile {
            chunk_name: name,
            generated_at: &generated_at,
            item_count: items.len(),
            items,
        };
        let checksum = hash_payload(&chunk_file)?;
        write_atomic(&dir.join(&file), &chunk_file)?;

        let mut source_files = chunk_to_files.get(name.as_str()).cloned().unwrap_or_default();
        source_files.sort();
        let source_hashes = source_files
            .iter()
            .filter_map(|f| output.source_hashes.get(f).map(|h| (f.clone(), h.clone())))
            .collect();

        chunks.push(ChunkInfo {
            name: name.clone(),
            file,
            item_count: items.len(),
            checksum,
            source_files,
            source_hashes,
        });
    }

    chunks.sort_by(|a, b| a.name.cmp(&b.name));

    let mut manifest = ChunkedManifest {
        status: EnvelopeStatus::Complete,
        generated_at,
        generator: output.generator.to_string(),
        source_globs: output.source_globs.to_vec(),
        checksum: String::new(),
        source_hashes: output.source_hashes,
        summary: output.summary,
        chunks,
        file_to_chunks,
    };
    manifest.checksum = manifest.compute_checksum()?;

    write_atomic(&dir.join(MANIFEST_FILE), &manifest)?;
    Ok(manifest)
}

/// RFC 3339 UTC timestamp with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
