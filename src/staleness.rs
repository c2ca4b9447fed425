//! Staleness detection for discovery artifacts.
//!
//! An artifact is stale when its envelope is missing, unreadable, fails
//! its own checksum, or records source hashes that differ from the current
//! ones. The diff runs in three passes: paths new since the envelope,
//! paths whose hash changed, and paths that disappeared.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use crate::config::ArtifactConfig;
use crate::envelope::{ChunkedManifest, DiscoveryEnvelope, MANIFEST_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedFile {
    pub path: String,
    pub kind: ChangeKind,
}

impl fmt::Display for ChangedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChangeKind::Added => write!(f, "+ {} (new)", self.path),
            ChangeKind::Modified => write!(f, "~ {} (modified)", self.path),
            ChangeKind::Deleted => write!(f, "- {} (deleted)", self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StaleReason {
    /// No envelope has been written yet.
    Missing,
    /// The envelope exists but could not be read or parsed.
    Unreadable(String),
    /// The envelope parsed but its checksum does not match its content.
    ChecksumMismatch,
    /// Source hashes differ; carries the number of changed files.
    SourcesChanged(usize),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Missing => f.write_str("Discovery file does not exist"),
            StaleReason::Unreadable(e) => write!(f, "Error reading discovery file: {}", e),
            StaleReason::ChecksumMismatch => f.write_str("Checksum mismatch (file was edited or truncated)"),
            StaleReason::SourcesChanged(n) => write!(f, "{} file(s) changed", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Staleness {
    Fresh,
    Stale {
        reason: StaleReason,
        changed: Vec<ChangedFile>,
    },
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Staleness::Stale { .. })
    }

    fn stale(reason: StaleReason) -> Self {
        Staleness::Stale {
            reason,
            changed: Vec::new(),
        }
    }
}

/// Diff stored hashes against current ones: additions and modifications
/// in current-path order, then deletions.
pub fn diff_hashes(
    stored: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> Vec<ChangedFile> {
    let mut changed = Vec::new();

    for (path, hash) in current {
        match stored.get(path) {
            None => changed.push(ChangedFile {
                path: path.clone(),
                kind: ChangeKind::Added,
            }),
            Some(old) if old != hash => changed.push(ChangedFile {
                path: path.clone(),
                kind: ChangeKind::Modified,
            }),
            Some(_) => {}
        }
    }

    for path in stored.keys() {
        if !current.contains_key(path) {
            changed.push(ChangedFile {
                path: path.clone(),
                kind: ChangeKind::Deleted,
            });
        }
    }

    changed
}

fn compare(stored: &BTreeMap<String, String>, current: &BTreeMap<String, String>) -> Staleness {
    let changed = diff_hashes(stored, current);
    if changed.is_empty() {
        Staleness::Fresh
    } else {
        Staleness::Stale {
            reason: StaleReason::SourcesChanged(changed.len()),
            changed,
        }
    }
}

/// Check one configured artifact under `state_dir`, dispatching on its
/// layout.
pub fn check_artifact(
    state_dir: &Path,
    artifact: &ArtifactConfig,
    current: &BTreeMap<String, String>,
) -> Staleness {
    let target = state_dir.join(&artifact.output);
    if artifact.chunked {
        check_chunked(&target, current)
    } else {
        check_envelope(&target, current)
    }
}

/// Check a single-file envelope at `path` against `current` hashes.
pub fn check_envelope(path: &Path, current: &BTreeMap<String, String>) -> Staleness {
    if !path.exists() {
        return Staleness::stale(StaleReason::Missing);
    }

    let envelope = match DiscoveryEnvelope::read(path) {
        Ok(e) => e,
        Err(e) => return Staleness::stale(StaleReason::Unreadable(format!("{:#}", e))),
    };

    match envelope.verify_checksum() {
        Ok(true) => compare(&envelope.source_hashes, current),
        Ok(false) => Staleness::stale(StaleReason::ChecksumMismatch),
        Err(e) => Staleness::stale(StaleReason::Unreadable(format!("{:#}", e))),
    }
}

/// Check a chunked artifact directory against `current` hashes.
pub fn check_chunked(dir: &Path, current: &BTreeMap<String, String>) -> Staleness {
    match load_manifest(dir) {
        Ok(manifest) => compare(&manifest.source_hashes, current),
        Err(reason) => Staleness::stale(reason),
    }
}

fn load_manifest(dir: &Path) -> std::result::Result<ChunkedManifest, StaleReason> {
    if !dir.join(MANIFEST_FILE).exists() {
        return Err(StaleReason::Missing);
    }
    let manifest =
        ChunkedManifest::read(dir).map_err(|e| StaleReason::Unreadable(format!("{:#}", e)))?;
    match manifest.verify_checksum() {
        Ok(true) => Ok(manifest),
        Ok(false) => Err(StaleReason::ChecksumMismatch),
        Err(e) => Err(StaleReason::Unreadable(format!("{:#}", e))),
    }
}

/// Incremental rebuild plan for a chunked artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkPlan {
    pub requires_full_regen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_regen_reason: Option<String>,
    pub stale_chunks: Vec<String>,
    pub fresh_chunks: Vec<String>,
    /// Chunk → why it must be rebuilt.
    pub stale_reasons: BTreeMap<String, String>,
}

impl ChunkPlan {
    fn full(reason: impl Into<String>) -> Self {
        Self {
            requires_full_regen: true,
            full_regen_reason: Some(reason.into()),
            stale_chunks: Vec::new(),
            fresh_chunks: Vec::new(),
            stale_reasons: BTreeMap::new(),
        }
    }

    pub fn has_stale_chunks(&self) -> bool {
        !self.stale_chunks.is_empty()
    }
}

/// Work out which chunks of `dir` must be rebuilt.
///
/// Modified and deleted files mark every chunk the manifest associates
/// with them. New files are assigned with `chunk_for`; a new chunk name
/// is stale by definition. A missing or unreadable manifest, or a file
/// `chunk_for` cannot place, forces a full rebuild.
pub fn stale_chunks<F>(dir: &Path, current: &BTreeMap<String, String>, chunk_for: F) -> ChunkPlan
where
    F: Fn(&str) -> Option<String>,
{
    let manifest = match load_manifest(dir) {
        Ok(m) => m,
        Err(reason) => return ChunkPlan::full(reason.to_string()),
    };

    let mut stale_reasons: BTreeMap<String, String> = BTreeMap::new();
    for change in diff_hashes(&manifest.source_hashes, current) {
        let known = match change.kind {
            ChangeKind::Added => None,
            ChangeKind::Modified | ChangeKind::Deleted => {
                manifest.file_to_chunks.get(&change.path).cloned()
            }
        };
        let chunks = match known.or_else(|| chunk_for(&change.path).map(|c| vec![c])) {
            Some(chunks) => chunks,
            None => {
                return ChunkPlan::full(format!("{} cannot be assigned to a chunk", change.path))
            }
        };
        for chunk in chunks {
            stale_reasons
                .entry(chunk)
                .and_modify(|r| {
                    r.push_str(", ");
                    r.push_str(&change.to_string());
                })
                .or_insert_with(|| change.to_string());
        }
    }

    let known: BTreeSet<&str> = manifest.chunks.iter().map(|c| c.name.as_str()).collect();
    let stale_chunks: Vec<String> = stale_reasons.keys().cloned().collect();
    let fresh_chunks: Vec<String> = known
        .iter()
        .filter(|name| !stale_reasons.contains_key(**name))
        .map(|name| name.to_string())
        .collect();

    ChunkPlan {
        requires_full_regen: false,
        full_regen_reason: None,
        stale_chunks,
        fresh_chunks,
        stale_reasons,
    }
}
