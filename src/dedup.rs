/// Three-level duplicate detection over the chunk corpus.
///
/// Levels run in order and are mutually exclusive: a chunk claimed by an
/// exact group is excluded from the structural pass, and structural
/// members are excluded from the semantic pass. The semantic level talks
/// to the vector backend; when it fails even after retries, the report is
/// still returned with the failure recorded per level rather than
/// discarding the cheaper passes.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::DedupConfig;
use crate::resilience::RetryPolicy;
use crate::store::{Chunk, ChunkId, ChunkStore};
use crate::vector::VectorFilter;
use crate::vector::pool::VectorPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateLevel {
    Exact,
    Structural,
    Semantic,
}

/// One group of mutually duplicate chunks. Confidence is 1.0 for the
/// deterministic levels; for semantic groups it is the lowest neighbor
/// similarity in the group.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub level: DuplicateLevel,
    pub confidence: f32,
    pub chunks: Vec<Arc<Chunk>>,
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateStats {
    pub chunks_scanned: usize,
    pub exact_groups: usize,
    pub structural_groups: usize,
    pub semantic_groups: usize,
}

/// A level that could not complete. Deterministic levels never fail; this
/// exists for the semantic pass and its backend.
#[derive(Debug, Clone)]
pub struct FailedLevel {
    pub level: DuplicateLevel,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct DuplicateReport {
    pub exact: Vec<DuplicateGroup>,
    pub structural: Vec<DuplicateGroup>,
    pub semantic: Vec<DuplicateGroup>,
    pub stats: DuplicateStats,
    pub failed_levels: Vec<FailedLevel>,
}

// ── Structural fingerprint ───────────────────────────────────────────

static STRING_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#).expect("string literal regex is valid")
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier regex is valid"));

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(\.\d+)?").expect("number regex is valid"));

/// Reduce content to its syntactic shape: string literals become `""`,
/// identifiers become `_`, numbers become `#`, and whitespace collapses.
/// Chunks that differ only in naming and literal values share a
/// fingerprint.
#[must_use]
pub fn structural_fingerprint(content: &str) -> String {
    let no_strings = STRING_LITERAL.replace_all(content, "\"\"");
    let no_idents = IDENTIFIER.replace_all(&no_strings, "_");
    let no_numbers = NUMBER.replace_all(&no_idents, "#");
    no_numbers.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Detector ─────────────────────────────────────────────────────────

/// Number of nearest neighbors fetched per semantic probe.
const SEMANTIC_NEIGHBORS: usize = 16;

pub struct DuplicateDetector {
    chunks: Arc<ChunkStore>,
    pool: Arc<VectorPool>,
    retry: RetryPolicy,
    config: DedupConfig,
}

impl DuplicateDetector {
    pub fn new(
        chunks: Arc<ChunkStore>,
        pool: Arc<VectorPool>,
        retry: RetryPolicy,
        config: DedupConfig,
    ) -> Self {
        Self {
            chunks,
            pool,
            retry,
            config,
        }
    }

    /// Run all three passes. `min_length` (in characters of chunk content)
    /// overrides the configured noise floor.
    pub async fn detect(&self, min_length: Option<usize>) -> DuplicateReport {
        let floor = min_length.unwrap_or(self.config.min_length);
        let candidates: Vec<Arc<Chunk>> = self
            .chunks
            .all()
            .into_iter()
            .filter(|c| c.content.chars().count() >= floor)
            .collect();

        let mut report = DuplicateReport {
            stats: DuplicateStats {
                chunks_scanned: candidates.len(),
                ..DuplicateStats::default()
            },
            ..DuplicateReport::default()
        };

        let mut claimed: HashSet<ChunkId> = HashSet::new();

        report.exact = Self::group_by_key(&candidates, &claimed, DuplicateLevel::Exact, |c| {
            c.content_hash.clone()
        });
        for group in &report.exact {
            claimed.extend(group.chunks.iter().map(|c| c.id));
        }

        report.structural =
            Self::group_by_key(&candidates, &claimed, DuplicateLevel::Structural, |c| {
                structural_fingerprint(&c.content)
            });
        for group in &report.structural {
            claimed.extend(group.chunks.iter().map(|c| c.id));
        }

        match self.semantic_pass(&candidates, &claimed).await {
            Ok(groups) => report.semantic = groups,
            Err(e) => {
                warn!("semantic duplicate pass failed: {e}");
                report.failed_levels.push(FailedLevel {
                    level: DuplicateLevel::Semantic,
                    message: e.to_string(),
                });
            }
        }

        report.stats.exact_groups = report.exact.len();
        report.stats.structural_groups = report.structural.len();
        report.stats.semantic_groups = report.semantic.len();
        debug!(
            "duplicate scan: {} chunks, {} exact / {} structural / {} semantic groups",
            report.stats.chunks_scanned,
            report.stats.exact_groups,
            report.stats.structural_groups,
            report.stats.semantic_groups
        );
        report
    }

    /// Group unclaimed candidates by a deterministic key; only groups of
    /// two or more survive. Group order follows first member insertion.
    fn group_by_key<K, F>(
        candidates: &[Arc<Chunk>],
        claimed: &HashSet<ChunkId>,
        level: DuplicateLevel,
        key_fn: F,
    ) -> Vec<DuplicateGroup>
    where
        K: std::hash::Hash + Eq + Clone,
        F: Fn(&Chunk) -> K,
    {
        let mut by_key: HashMap<K, Vec<Arc<Chunk>>> = HashMap::new();
        let mut key_order: Vec<K> = Vec::new();
        for chunk in candidates {
            if claimed.contains(&chunk.id) {
                continue;
            }
            let key = key_fn(chunk);
            if !by_key.contains_key(&key) {
                key_order.push(key.clone());
            }
            by_key.entry(key).or_default().push(chunk.clone());
        }

        key_order
            .into_iter()
            .filter_map(|key| by_key.remove(&key))
            .filter(|members| members.len() >= 2)
            .map(|members| DuplicateGroup {
                level,
                confidence: 1.0,
                chunks: members,
            })
            .collect()
    }

    /// Semantic grouping via nearest-neighbor queries against the vector
    /// backend, wrapped in the retry policy. A handle that returns a
    /// transient error is discarded so the pool reconnects.
    async fn semantic_pass(
        &self,
        candidates: &[Arc<Chunk>],
        claimed: &HashSet<ChunkId>,
    ) -> crate::error::EngineResult<Vec<DuplicateGroup>> {
        let remaining: HashMap<ChunkId, Arc<Chunk>> = candidates
            .iter()
            .filter(|c| !claimed.contains(&c.id))
            .map(|c| (c.id, c.clone()))
            .collect();

        let mut grouped: HashSet<ChunkId> = HashSet::new();
        let mut groups = Vec::new();

        for chunk in candidates {
            if claimed.contains(&chunk.id) || grouped.contains(&chunk.id) {
                continue;
            }

            let pool = &self.pool;
            let chunk_id = chunk.id;
            let matches = self
                .retry
                .execute("dedup_semantic", move || async move {
                    let mut handle = pool.acquire().await?;
                    let embedding = match handle.store().get_embedding(chunk_id).await {
                        Ok(e) => e,
                        Err(e) => {
                            if e.is_retryable() {
                                handle.mark_broken();
                            }
                            return Err(e);
                        }
                    };
                    // Not in the vector backend yet: nothing to compare.
                    let Some(embedding) = embedding else {
                        return Ok(Vec::new());
                    };
                    let filter = VectorFilter {
                        exclude_ids: vec![chunk_id],
                        ..VectorFilter::default()
                    };
                    match handle
                        .store()
                        .query_by_vector(&embedding, SEMANTIC_NEIGHBORS, Some(&filter))
                        .await
                    {
                        Ok(m) => Ok(m),
                        Err(e) => {
                            if e.is_retryable() {
                                handle.mark_broken();
                            }
                            Err(e)
                        }
                    }
                })
                .await?;

            let mut members = vec![chunk.clone()];
            let mut confidence = 1.0f32;
            for m in matches {
                if m.similarity < self.config.semantic_threshold || grouped.contains(&m.id) {
                    continue;
                }
                // Only chunks still unclaimed by the cheaper levels count.
                let Some(candidate) = remaining.get(&m.id) else {
                    continue;
                };
                confidence = confidence.min(m.similarity);
                members.push(candidate.clone());
            }

            if members.len() >= 2 {
                grouped.extend(members.iter().map(|c| c.id));
                groups.push(DuplicateGroup {
                    level: DuplicateLevel::Semantic,
                    confidence,
                    chunks: members,
                });
            }
        }

        Ok(groups)
    }
}
