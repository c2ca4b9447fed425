//! Optional JSONL log of tool invocations.
//!
//! Each call appends `{ts, tool, ok, duration_ms}`. Writing the log is a
//! secondary concern: failures go to [`discard_usage_log_error`] and the
//! tool call itself still succeeds.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::envelope::now_iso;

#[derive(Debug, Serialize)]
struct UsageRecord<'a> {
    ts: String,
    tool: &'a str,
    ok: bool,
    duration_ms: u64,
}

#[derive(Debug, Clone)]
pub enum UsageLog {
    File(PathBuf),
    Disabled,
}

impl UsageLog {
    pub fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(p) => UsageLog::File(p.to_path_buf()),
            None => UsageLog::Disabled,
        }
    }

    /// Append one record. Never fails.
    pub fn record(&self, tool: &str, ok: bool, elapsed: Duration) {
        if let UsageLog::File(path) = self {
            let record = UsageRecord {
                ts: now_iso(),
                tool,
                ok,
                duration_ms: elapsed.as_millis() as u64,
            };
            if let Err(e) = append(path, &record) {
                discard_usage_log_error(e);
            }
        }
    }
}

fn append(path: &Path, record: &UsageRecord<'_>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open usage log {}", path.display()))?;
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Fallback for usage-log write failures: note it at debug level and move on.
pub fn discard_usage_log_error(err: anyhow::Error) {
    log::debug!("usage log write skipped: {:#}", err);
}
