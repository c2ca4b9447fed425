//! Reciprocal Rank Fusion of lexical and semantic result lists.
//!
//! # Algorithm
//!
//! 1. Key every hit by `file:line`.
//! 2. For each list, the hit at zero-based position `i` contributes
//!    `1 / (k + i + 1)` to its key's running score and adds the list's
//!    provenance tag.
//! 3. Sort accumulators by score, descending. The sort is stable, so ties
//!    keep first-seen order (lexical list first, then semantic).
//!
//! A hit present in both lists gets the sum of both contributions, which
//! lifts corroborated results without normalizing BM25 scores against
//! cosine similarities. Larger `k` flattens the gap between adjacent ranks.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::models::{Provenance, RankedResult, SearchHit};
use crate::usage_log::UsageLog;

/// Default RRF constant.
pub const DEFAULT_K: f64 = 60.0;

/// A validated RRF constant (finite and strictly positive).
///
/// Every external surface (config, CLI flag, HTTP tool) builds one of these
/// before calling [`reciprocal_rank_fusion`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfK(f64);

impl RrfK {
    pub fn new(k: f64) -> Result<Self> {
        if !k.is_finite() || k <= 0.0 {
            bail!("rrf k must be a finite number > 0, got {}", k);
        }
        Ok(Self(k))
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl Default for RrfK {
    fn default() -> Self {
        Self(DEFAULT_K)
    }
}

struct Accumulator {
    file: String,
    line: i64,
    content: String,
    score: f64,
    sources: Vec<Provenance>,
}

/// Fuse two ranked lists into one ranking.
///
/// `k` must be strictly positive. It is not checked here: a zero or
/// negative `k` yields meaningless (possibly infinite) scores rather than a
/// clamped ranking. Use [`RrfK`] at API boundaries.
///
/// Empty inputs are valid and contribute nothing. Content for a key comes
/// from the first list that surfaced it.
pub fn reciprocal_rank_fusion(
    lexical: &[SearchHit],
    semantic: &[SearchHit],
    k: f64,
) -> Vec<RankedResult> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut accumulators: Vec<Accumulator> = Vec::new();

    for (hits, tag) in [(lexical, Provenance::Lexical), (semantic, Provenance::Semantic)] {
        for (i, hit) in hits.iter().enumerate() {
            let rank = (i + 1) as f64;
            let contribution = 1.0 / (k + rank);

            match slots.get(&hit.key()) {
                Some(&slot) => {
                    let acc = &mut accumulators[slot];
                    acc.score += contribution;
                    if !acc.sources.contains(&tag) {
                        acc.sources.push(tag);
                    }
                }
                None => {
                    slots.insert(hit.key(), accumulators.len());
                    accumulators.push(Accumulator {
                        file: hit.file.clone(),
                        line: hit.line,
                        content: hit.content.clone(),
                        score: contribution,
                        sources: vec![tag],
                    });
                }
            }
        }
    }

    accumulators.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    accumulators
        .into_iter()
        .map(|acc| RankedResult {
            file: acc.file,
            line: acc.line,
            content: acc.content,
            score: acc.score,
            sources: acc.sources,
        })
        .collect()
}

/// Fuse with a validated `k`, then keep the top `limit` (`0` keeps all).
pub fn fuse(
    lexical: &[SearchHit],
    semantic: &[SearchHit],
    k: RrfK,
    limit: usize,
) -> Vec<RankedResult> {
    let mut results = reciprocal_rank_fusion(lexical, semantic, k.get());
    if limit > 0 {
        results.truncate(limit);
    }
    results
}

/// Read a JSON array of `{file, line, content}` hits.
pub fn read_hits(path: &Path) -> Result<Vec<SearchHit>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{}: expected a JSON array of {{file, line, content}}", path.display()))
}

/// Run the fuse command. `k` and `limit` fall back to `[retrieval]`.
pub fn run_fuse(
    config: &Config,
    lexical_path: &Path,
    semantic_path: &Path,
    k: Option<f64>,
    limit: Option<usize>,
) -> Result<()> {
    let started = Instant::now();
    let k = match k {
        Some(k) => RrfK::new(k)?,
        None => config.rrf_k()?,
    };
    let limit = limit.unwrap_or(config.retrieval.final_limit);

    let lexical = read_hits(lexical_path)?;
    let semantic = read_hits(semantic_path)?;
    log::debug!(
        "fusing {} lexical and {} semantic hits with k={}",
        lexical.len(),
        semantic.len(),
        k.get()
    );

    let results = fuse(&lexical, &semantic, k, limit);
    UsageLog::from_path(config.logging.usage_log.as_deref()).record(
        "fuse_results",
        true,
        started.elapsed(),
    );
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
