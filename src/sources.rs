//! Source enumeration for discovery artifacts.
//!
//! Walks the discovery root and keeps files matching an artifact's include
//! globs and none of its exclude globs. Paths come back relative to the
//! root, `/`-separated and sorted, which is the form envelopes store them in.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::ArtifactConfig;

/// Chunk name for files with too few path components.
pub const ROOT_CHUNK: &str = "_root";

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

pub fn enumerate_sources(root: &Path, artifact: &ArtifactConfig) -> Result<Vec<String>> {
    if !root.exists() {
        bail!("discovery root does not exist: {}", root.display());
    }

    let include_set = build_globset(&artifact.include_globs)?;

    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(artifact.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut paths = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = to_slash(relative);

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        paths.push(rel_str);
    }

    paths.sort();
    log::debug!(
        "{} source file(s) under {} for '{}'",
        paths.len(),
        root.display(),
        artifact.output
    );
    Ok(paths)
}

/// The path component at `segment` names the chunk a file belongs to.
pub fn chunk_name_for(path: &str, segment: usize) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    // The last component is the file itself, never a chunk.
    if segment + 1 < parts.len() {
        parts[segment].to_string()
    } else {
        ROOT_CHUNK.to_string()
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
