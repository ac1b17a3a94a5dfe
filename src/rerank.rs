/// Second-pass result scoring.
///
/// A reranker receives (query, candidates) and reorders the candidates.
/// It is optional and replaceable: the engine treats any reranker error as
/// graceful degradation, keeping the pre-rerank order instead of failing
/// the request.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::engine::SearchResult;
use crate::error::EngineResult;
use crate::index::lexical::tokenize;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Reorder `results` in place by relevance to `query`.
    async fn rerank(&self, query: &str, results: &mut [SearchResult]) -> EngineResult<()>;
}

/// Pass-through reranker.
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    async fn rerank(&self, _query: &str, _results: &mut [SearchResult]) -> EngineResult<()> {
        Ok(())
    }
}

/// Heuristic fallback reranker: blends the backend similarity with
/// query-term overlap in the chunk content, then re-sorts by the blended
/// score. No model involved, so it cannot become unavailable.
pub struct HeuristicReranker;

impl HeuristicReranker {
    fn blended_score(query_terms: &[String], result: &SearchResult) -> f32 {
        if query_terms.is_empty() {
            return result.similarity;
        }
        let content_tokens = tokenize(&result.chunk.content);
        let overlap = query_terms
            .iter()
            .filter(|t| content_tokens.contains(*t))
            .count() as f32
            / query_terms.len() as f32;
        0.7 * result.similarity + 0.3 * overlap
    }
}

#[async_trait]
impl Reranker for HeuristicReranker {
    async fn rerank(&self, query: &str, results: &mut [SearchResult]) -> EngineResult<()> {
        let query_terms = tokenize(query);
        let mut scored: Vec<(f32, SearchResult)> = results
            .iter()
            .cloned()
            .map(|r| (Self::blended_score(&query_terms, &r), r))
            .collect();

        // Stable sort keeps the fused order for equal blends.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        for (slot, (_, result)) in results.iter_mut().zip(scored) {
            *slot = result;
        }
        Ok(())
    }
}

// ── Shared instance ──────────────────────────────────────────────────

static SHARED: Mutex<Option<Arc<dyn Reranker>>> = Mutex::new(None);

/// Process-wide shared reranker, lazily initialized to the heuristic
/// implementation on first use.
pub fn shared_reranker() -> Arc<dyn Reranker> {
    let mut guard = SHARED.lock().expect("shared reranker lock poisoned");
    guard
        .get_or_insert_with(|| Arc::new(HeuristicReranker))
        .clone()
}

/// Replace the shared reranker (e.g. with a model-backed implementation).
pub fn set_shared_reranker(reranker: Arc<dyn Reranker>) {
    *SHARED.lock().expect("shared reranker lock poisoned") = Some(reranker);
}

/// Drop the shared instance so the next use re-initializes. For test
/// isolation.
pub fn reset_shared_reranker() {
    *SHARED.lock().expect("shared reranker lock poisoned") = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Chunk, ChunkKind, content_hash};

    fn result(id: u64, content: &str, similarity: f32) -> SearchResult {
        SearchResult {
            chunk: Arc::new(Chunk {
                id,
                path: format!("src/file{id}.rs"),
                start_line: 1,
                end_line: 10,
                language: "rust".to_string(),
                content: content.to_string(),
                content_hash: content_hash(content),
                name: None,
                kind: ChunkKind::Function,
            }),
            similarity,
            lexical_score: None,
            context_before: Vec::new(),
            context_after: Vec::new(),
            file_missing: false,
        }
    }

    #[tokio::test]
    async fn test_noop_keeps_order() {
        let mut results = vec![result(1, "aaa", 0.9), result(2, "bbb", 0.5)];
        NoopReranker.rerank("query", &mut results).await.unwrap();
        assert_eq!(results[0].chunk.id, 1);
        assert_eq!(results[1].chunk.id, 2);
    }

    #[tokio::test]
    async fn test_heuristic_promotes_term_overlap() {
        // Close similarity scores, but only the second chunk mentions the
        // query terms.
        let mut results = vec![
            result(1, "fn unrelated() {}", 0.60),
            result(2, "fn authenticate(user) { check(user) }", 0.58),
        ];
        HeuristicReranker
            .rerank("authenticate user", &mut results)
            .await
            .unwrap();
        assert_eq!(results[0].chunk.id, 2);
    }

    #[tokio::test]
    async fn test_heuristic_empty_query_keeps_similarity_order() {
        let mut results = vec![result(1, "aaa", 0.9), result(2, "bbb", 0.5)];
        HeuristicReranker.rerank("", &mut results).await.unwrap();
        assert_eq!(results[0].chunk.id, 1);
    }

    #[test]
    fn test_shared_instance_reset() {
        reset_shared_reranker();
        let a = shared_reranker();
        let b = shared_reranker();
        assert!(Arc::ptr_eq(&a, &b), "lazily-initialized singleton");

        reset_shared_reranker();
        let c = shared_reranker();
        assert!(!Arc::ptr_eq(&a, &c), "reset must drop the old instance");
    }
}
