/// Search engine orchestrator.
///
/// Composes the chunk store, lexical index, pooled vector client, query
/// processor, reranker, and context service into one ranked-result
/// pipeline, and fronts the relationship store and duplicate detector for
/// the transport layer above.
pub mod query;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::context::ContextService;
use crate::dedup::{DuplicateDetector, DuplicateReport};
use crate::error::{EngineError, EngineResult};
use crate::index::lexical::LexicalIndex;
use crate::relations::{ComputeHandle, RelationshipGraph, RelationshipStore, SymbolRelationships};
use crate::rerank::{Reranker, shared_reranker};
use crate::resilience::RetryPolicy;
use crate::store::{Chunk, ChunkId, ChunkInput, ChunkKind, ChunkStore, UpsertOutcome};
use crate::vector::pool::VectorPool;
use crate::vector::{
    META_HASH, META_LANGUAGE, META_NAME, META_PATH, VectorConnector, VectorFilter, VectorRecord,
};
use query::QueryProcessor;

/// One ranked answer. Similarity is the primary (vector) score in [0, 1];
/// `lexical_score` is present when the chunk also matched lexically.
/// Results that survived on lexical evidence alone (vector backend down)
/// carry similarity 0.0 and sort after every vector-scored result.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: Arc<Chunk>,
    pub similarity: f32,
    pub lexical_score: Option<f32>,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
    pub file_missing: bool,
}

/// Acknowledgement for an `index` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexAck {
    pub indexed: usize,
    pub skipped: usize,
}

pub struct Engine {
    config: EngineConfig,
    chunks: Arc<ChunkStore>,
    lexical: LexicalIndex,
    pool: Arc<VectorPool>,
    queries: QueryProcessor,
    retry: RetryPolicy,
    context: ContextService,
    relations: Arc<RelationshipStore>,
    dedup: DuplicateDetector,
    /// Construction-time override; `None` falls back to the process-wide
    /// shared instance when reranking is enabled.
    reranker: Option<Arc<dyn Reranker>>,
}

impl Engine {
    pub fn new(config: EngineConfig, connector: Arc<dyn VectorConnector>) -> EngineResult<Self> {
        let chunks = Arc::new(ChunkStore::new());
        let pool = Arc::new(VectorPool::new(
            connector,
            config.pool.size,
            Duration::from_millis(config.pool.acquire_timeout_ms),
        ));
        let retry = RetryPolicy::from_config(&config.retry);
        let relations = Arc::new(RelationshipStore::new(chunks.clone())?);
        let dedup = DuplicateDetector::new(
            chunks.clone(),
            pool.clone(),
            retry.clone(),
            config.dedup.clone(),
        );
        let context = ContextService::new(config.file_cache_capacity, config.search.context_lines);
        let queries = QueryProcessor::new(config.search.expand_queries);

        Ok(Self {
            config,
            chunks,
            lexical: LexicalIndex::new(),
            pool,
            queries,
            retry,
            context,
            relations,
            dedup,
            reranker: None,
        })
    }

    /// Engine over the in-process vector backend, with embedding
    /// dimensionality taken from the configuration. External-service
    /// deployments construct their own connector and use [`Engine::new`].
    pub fn in_memory(config: EngineConfig) -> EngineResult<Self> {
        let backend = crate::vector::memory::InMemoryVectorBackend::new(Arc::new(
            crate::embedder::hashed::HashedEmbedder::new(config.embedding_dimensions),
        ));
        Self::new(config, Arc::new(backend))
    }

    /// Replace the reranker for this engine instance (tests, model-backed
    /// deployments). Without this, the shared process-wide instance is
    /// used.
    pub fn set_reranker(&mut self, reranker: Arc<dyn Reranker>) {
        self.reranker = Some(reranker);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Stop background work; in-flight relationship recomputation is
    /// discarded rather than swapped in half-built.
    pub fn shutdown(&self) {
        self.relations.shutdown();
    }

    // ── Indexing ─────────────────────────────────────────────────────

    /// Ingest parsed chunks: upsert into the chunk store, index lexically,
    /// and push embeddings to the vector backend. Chunks whose content is
    /// unchanged at the same location are skipped entirely.
    pub async fn index(&self, inputs: Vec<ChunkInput>) -> EngineResult<IndexAck> {
        let mut ack = IndexAck::default();
        let mut records = Vec::new();

        for input in inputs {
            let (id, outcome) = self.chunks.upsert(input);
            if outcome == UpsertOutcome::Unchanged {
                ack.skipped += 1;
                continue;
            }
            ack.indexed += 1;

            let Some(chunk) = self.chunks.get(id) else {
                continue;
            };
            self.lexical.add(id, &chunk.content);

            let mut metadata = HashMap::from([
                (META_PATH.to_string(), chunk.path.clone()),
                (META_HASH.to_string(), chunk.content_hash.clone()),
                (META_LANGUAGE.to_string(), chunk.language.clone()),
            ]);
            if let Some(name) = &chunk.name {
                metadata.insert(META_NAME.to_string(), name.clone());
            }
            records.push(VectorRecord {
                id,
                embedding: None,
                document: chunk.content.clone(),
                metadata,
            });
        }

        if !records.is_empty() {
            self.relations.invalidate();

            let pool = &self.pool;
            let records_ref = &records;
            self.retry
                .execute("vector_upsert", move || {
                    let batch = records_ref.clone();
                    async move {
                        let mut handle = pool.acquire().await?;
                        match handle.store().upsert(batch).await {
                            Ok(()) => Ok(()),
                            Err(e) => {
                                if e.is_retryable() {
                                    handle.mark_broken();
                                }
                                Err(e)
                            }
                        }
                    }
                })
                .await?;
        }

        debug!("indexed {} chunks, {} unchanged", ack.indexed, ack.skipped);
        Ok(ack)
    }

    // ── Search pipeline ──────────────────────────────────────────────

    /// Hybrid search: expanded query fans out to the lexical index and the
    /// vector backend in parallel, results are fused on vector similarity,
    /// optionally reranked, context-enriched, and truncated to `limit`.
    ///
    /// A vector backend that stays down after retries degrades the call to
    /// lexical-only results; a failing reranker keeps the fused order.
    /// Neither fails the request.
    pub async fn search(
        &self,
        raw_query: &str,
        limit: Option<usize>,
        threshold: Option<f32>,
        include_context: bool,
    ) -> EngineResult<Vec<SearchResult>> {
        let limit = limit.unwrap_or(self.config.search.default_limit);
        let threshold = threshold.unwrap_or(self.config.search.default_threshold);

        let terms = self.queries.process(raw_query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        // Overfetch so fusion and reranking have candidates to work with.
        let fetch = limit.saturating_mul(3).max(limit);
        let expanded = terms.join(" ");

        let pool = &self.pool;
        let expanded_ref = expanded.as_str();
        let vector_fut = self.retry.execute("vector_query", move || async move {
            let mut handle = pool.acquire().await?;
            match handle.store().query_by_text(expanded_ref, fetch, None).await {
                Ok(matches) => Ok(matches),
                Err(e) => {
                    if e.is_retryable() {
                        handle.mark_broken();
                    }
                    Err(e)
                }
            }
        });
        let lexical_fut = async { self.lexical.search(&terms, fetch) };
        let (vector_result, lexical_hits) = tokio::join!(vector_fut, lexical_fut);

        let (vector_matches, vector_degraded) = match vector_result {
            Ok(matches) => (matches, false),
            Err(e) => {
                warn!("vector retrieval failed, degrading to lexical-only: {e}");
                (Vec::new(), true)
            }
        };

        let lexical_by_id: HashMap<ChunkId, f32> = lexical_hits
            .iter()
            .map(|h| (h.chunk_id, h.score))
            .collect();

        // Fusion: vector similarity is the primary score and the threshold
        // is final — a candidate the backend scored below it stays dropped
        // even when it also matched lexically. Lexical hits stand on their
        // own only when the vector leg is down entirely.
        let mut results: Vec<SearchResult> = Vec::new();
        for m in vector_matches {
            if m.similarity < threshold {
                continue;
            }
            let Some(chunk) = self.chunks.get(m.id) else {
                continue;
            };
            results.push(SearchResult {
                chunk,
                similarity: m.similarity.clamp(0.0, 1.0),
                lexical_score: lexical_by_id.get(&m.id).copied(),
                context_before: Vec::new(),
                context_after: Vec::new(),
                file_missing: false,
            });
        }
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if vector_degraded {
            for hit in &lexical_hits {
                let Some(chunk) = self.chunks.get(hit.chunk_id) else {
                    continue;
                };
                results.push(SearchResult {
                    chunk,
                    similarity: 0.0,
                    lexical_score: Some(hit.score),
                    context_before: Vec::new(),
                    context_after: Vec::new(),
                    file_missing: false,
                });
            }
        }

        if self.config.search.rerank && !results.is_empty() {
            let reranker = self
                .reranker
                .clone()
                .unwrap_or_else(shared_reranker);
            if let Err(e) = reranker.rerank(raw_query, &mut results).await {
                warn!("reranker failed, keeping fused order: {e}");
            }
        }

        results.truncate(limit);

        if include_context {
            for result in &mut results {
                match self.context.surrounding(
                    &result.chunk.path,
                    result.chunk.start_line,
                    result.chunk.end_line,
                ) {
                    Some(ctx) => {
                        result.context_before = ctx.before;
                        result.context_after = ctx.after;
                    }
                    None => result.file_missing = true,
                }
            }
        }

        Ok(results)
    }

    /// Exact-then-prefix symbol lookup by recorded name.
    pub fn find_symbol(&self, name: &str, kind: Option<ChunkKind>) -> Vec<Arc<Chunk>> {
        self.chunks.find_symbol(name, kind)
    }

    /// Nearest neighbors of the chunk at `path` (narrowed by name when
    /// given), excluding the probe chunk itself.
    pub async fn search_similar(
        &self,
        path: &str,
        function_name: Option<&str>,
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> EngineResult<Vec<SearchResult>> {
        let limit = limit.unwrap_or(self.config.search.default_limit);
        let threshold = threshold.unwrap_or(self.config.search.default_threshold);

        let candidates = self.chunks.chunks_for_path(path);
        let probe = match function_name {
            Some(name) => candidates
                .iter()
                .find(|c| c.name.as_deref() == Some(name))
                .cloned(),
            None => candidates.into_iter().next(),
        }
        .ok_or_else(|| {
            EngineError::NotFound(match function_name {
                Some(name) => format!("chunk '{name}' in {path}"),
                None => format!("chunk in {path}"),
            })
        })?;

        let pool = &self.pool;
        let probe_ref = &probe;
        let matches = self
            .retry
            .execute("vector_neighbors", move || async move {
                let mut handle = pool.acquire().await?;
                let filter = VectorFilter {
                    exclude_ids: vec![probe_ref.id],
                    ..VectorFilter::default()
                };
                let embedding = match handle.store().get_embedding(probe_ref.id).await {
                    Ok(e) => e,
                    Err(e) => {
                        if e.is_retryable() {
                            handle.mark_broken();
                        }
                        return Err(e);
                    }
                };
                let result = match embedding {
                    Some(vector) => {
                        handle
                            .store()
                            .query_by_vector(&vector, limit, Some(&filter))
                            .await
                    }
                    // Probe never reached the backend: fall back to its
                    // stored content.
                    None => {
                        handle
                            .store()
                            .query_by_text(&probe_ref.content, limit, Some(&filter))
                            .await
                    }
                };
                match result {
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

        Ok(matches
            .into_iter()
            .filter(|m| m.similarity >= threshold)
            .filter_map(|m| {
                self.chunks.get(m.id).map(|chunk| SearchResult {
                    chunk,
                    similarity: m.similarity.clamp(0.0, 1.0),
                    lexical_score: None,
                    context_before: Vec::new(),
                    context_after: Vec::new(),
                    file_missing: false,
                })
            })
            .collect())
    }

    // ── Relationships ────────────────────────────────────────────────

    pub fn invalidate_relationships(&self) {
        self.relations.invalidate();
    }

    pub fn relationships(&self) -> Arc<RelationshipGraph> {
        self.relations.load()
    }

    /// Recompute the relationship graph synchronously; empty
    /// `changed_paths` means a full rebuild.
    pub async fn compute_relationships(
        &self,
        changed_paths: &[String],
    ) -> EngineResult<Arc<RelationshipGraph>> {
        let graph = self.relations.compute(changed_paths).await?;
        self.persist_relationships()?;
        Ok(graph)
    }

    /// Schedule recomputation in the background and return immediately.
    /// The store reflects the result only after the handle resolves; a
    /// configured snapshot path is written then as well.
    pub fn compute_relationships_background(&self, changed_paths: Vec<String>) -> ComputeHandle {
        let snapshot = self
            .config
            .graph_snapshot_path
            .as_ref()
            .map(std::path::PathBuf::from);
        self.relations.compute_background(changed_paths, snapshot)
    }

    pub fn symbol_relationships(&self, name: &str) -> EngineResult<SymbolRelationships> {
        self.relations.symbol_relationships(name)
    }

    fn persist_relationships(&self) -> EngineResult<()> {
        if let Some(path) = &self.config.graph_snapshot_path {
            self.relations.save_to(Path::new(path))?;
        }
        Ok(())
    }

    /// Restore the persisted graph snapshot, when one is configured and
    /// present.
    pub fn restore_relationships(&self) -> EngineResult<()> {
        if let Some(path) = &self.config.graph_snapshot_path {
            if Path::new(path).exists() {
                self.relations.load_from(Path::new(path))?;
            }
        }
        Ok(())
    }

    // ── Duplicates ───────────────────────────────────────────────────

    pub async fn detect_duplicates(&self, min_length: Option<usize>) -> DuplicateReport {
        self.dedup.detect(min_length).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::hashed::HashedEmbedder;
    use crate::rerank::NoopReranker;
    use crate::vector::VectorStore;
    use async_trait::async_trait;

    fn chunk_input(path: &str, name: Option<&str>, content: &str) -> ChunkInput {
        ChunkInput {
            path: path.to_string(),
            start_line: 1,
            end_line: 8,
            language: "rust".to_string(),
            content: content.to_string(),
            name: name.map(str::to_string),
            kind: ChunkKind::Function,
        }
    }

    fn test_engine() -> Engine {
        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 5;
        config.pool.acquire_timeout_ms = 200;
        let backend =
            crate::vector::memory::InMemoryVectorBackend::new(Arc::new(HashedEmbedder::default()));
        let mut engine = Engine::new(config, Arc::new(backend)).unwrap();
        engine.set_reranker(Arc::new(NoopReranker));
        engine
    }

    #[tokio::test]
    async fn test_index_ack_counts() {
        let engine = test_engine();
        let ack = engine
            .index(vec![
                chunk_input("a.rs", Some("alpha"), "fn alpha() { beta() }"),
                chunk_input("b.rs", Some("beta"), "fn beta() {}"),
            ])
            .await
            .unwrap();
        assert_eq!(ack, IndexAck { indexed: 2, skipped: 0 });

        // Re-indexing identical content is a no-op.
        let ack = engine
            .index(vec![chunk_input("a.rs", Some("alpha"), "fn alpha() { beta() }")])
            .await
            .unwrap();
        assert_eq!(ack, IndexAck { indexed: 0, skipped: 1 });
        assert_eq!(engine.chunk_count(), 2);
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_score_range() {
        let engine = test_engine();
        let inputs: Vec<ChunkInput> = (0..8)
            .map(|i| {
                let mut input = chunk_input(
                    &format!("src/f{i}.rs"),
                    None,
                    "fn parse_request(buffer) { decode_header(buffer) }",
                );
                input.start_line = i * 10 + 1;
                input.end_line = i * 10 + 8;
                input
            })
            .collect();
        engine.index(inputs).await.unwrap();

        let results = engine
            .search("parse request header", Some(3), Some(0.0), false)
            .await
            .unwrap();
        assert!(results.len() <= 3);
        assert!(!results.is_empty());
        for r in &results {
            assert!((0.0..=1.0).contains(&r.similarity), "similarity out of range");
        }
    }

    #[tokio::test]
    async fn test_synonym_expansion_reaches_login_chunk() {
        let engine = test_engine();
        engine
            .index(vec![
                chunk_input("auth.rs", Some("login"), "fn login(user, password) { verify(user) }"),
                chunk_input("buf.rs", None, "struct RingBuffer { data: Vec<u8> }"),
            ])
            .await
            .unwrap();

        // "auth" itself appears nowhere; expansion adds "login".
        let results = engine.search("auth", None, Some(0.0), false).await.unwrap();
        assert!(
            results.iter().any(|r| r.chunk.path == "auth.rs"),
            "expanded query must reach the login-only chunk"
        );
    }

    #[tokio::test]
    async fn test_failing_reranker_keeps_fused_order() {
        struct FailingReranker;
        #[async_trait]
        impl Reranker for FailingReranker {
            async fn rerank(&self, _q: &str, _r: &mut [SearchResult]) -> EngineResult<()> {
                Err(EngineError::ModelUnavailable("rerank model gone".to_string()))
            }
        }

        let mut engine = test_engine();
        engine.set_reranker(Arc::new(FailingReranker));
        engine
            .index(vec![
                chunk_input("a.rs", None, "connection pool acquire timeout handling"),
                chunk_input("b.rs", None, "connection pool release path"),
            ])
            .await
            .unwrap();

        let with_failing = engine
            .search("connection pool", None, Some(0.0), false)
            .await
            .expect("reranker failure must not fail the query");
        assert!(!with_failing.is_empty());

        // Same engine state, inert reranker: same order.
        engine.set_reranker(Arc::new(NoopReranker));
        let baseline = engine
            .search("connection pool", None, Some(0.0), false)
            .await
            .unwrap();
        let ids = |rs: &[SearchResult]| rs.iter().map(|r| r.chunk.id).collect::<Vec<_>>();
        assert_eq!(ids(&with_failing), ids(&baseline));
    }

    #[tokio::test]
    async fn test_search_degrades_to_lexical_when_backend_down() {
        struct DownConnector;
        impl VectorConnector for DownConnector {
            fn connect(&self) -> EngineResult<Box<dyn VectorStore>> {
                Err(EngineError::transient("connect", "backend down"))
            }
        }

        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 5;
        let mut engine = Engine::new(config, Arc::new(DownConnector)).unwrap();
        engine.set_reranker(Arc::new(NoopReranker));

        // Indexing fails at the vector upsert but the lexical index is
        // already populated.
        let _ = engine
            .index(vec![chunk_input("a.rs", None, "retry backoff executor")])
            .await;

        let results = engine
            .search("retry backoff", None, None, false)
            .await
            .expect("vector outage must degrade, not fail");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].similarity, 0.0, "lexical-only survivor");
        assert!(results[0].lexical_score.is_some());
    }

    #[tokio::test]
    async fn test_threshold_is_final_for_hybrid_matches() {
        let engine = test_engine();
        engine
            .index(vec![chunk_input("a.rs", None, "retry backoff executor loop")])
            .await
            .unwrap();

        // The chunk matches lexically, but its vector similarity cannot
        // clear an extreme threshold — it must not re-enter on the
        // lexical leg while the backend is healthy.
        let results = engine
            .search("retry backoff", None, Some(0.999), false)
            .await
            .unwrap();
        assert!(
            results.is_empty(),
            "below-threshold match must stay dropped"
        );
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let engine = test_engine();
        let results = engine.search("   ", None, None, false).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_find_symbol() {
        let engine = test_engine();
        engine
            .index(vec![
                chunk_input("a.rs", Some("parse"), "fn parse() {}"),
                chunk_input("b.rs", Some("parse_config"), "fn parse_config() {}"),
            ])
            .await
            .unwrap();

        let matches = engine.find_symbol("parse", None);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].name.as_deref(), Some("parse"));
    }

    #[tokio::test]
    async fn test_search_similar_excludes_probe() {
        let engine = test_engine();
        engine
            .index(vec![
                chunk_input(
                    "a.rs",
                    Some("save_user"),
                    "write user record into storage table",
                ),
                chunk_input(
                    "b.rs",
                    Some("save_order"),
                    "write order record into storage table",
                ),
            ])
            .await
            .unwrap();

        let neighbors = engine
            .search_similar("a.rs", Some("save_user"), None, Some(0.0))
            .await
            .unwrap();
        assert!(!neighbors.is_empty());
        assert!(neighbors.iter().all(|r| r.chunk.path != "a.rs"));
    }

    #[tokio::test]
    async fn test_search_similar_unknown_location() {
        let engine = test_engine();
        let result = engine.search_similar("ghost.rs", None, None, None).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_relationship_flow_through_engine() {
        let engine = test_engine();
        engine
            .index(vec![
                chunk_input("a.rs", Some("caller_fn"), "fn caller_fn() { target_fn() }"),
                chunk_input("b.rs", Some("target_fn"), "fn target_fn() {}"),
            ])
            .await
            .unwrap();

        assert!(engine.relationships().callers.is_empty());
        engine.compute_relationships(&[]).await.unwrap();

        let rels = engine.symbol_relationships("target_fn").unwrap();
        assert_eq!(rels.callers.len(), 1);
        assert_eq!(rels.callers[0].name.as_deref(), Some("caller_fn"));
        assert!(rels.callees.is_empty());
    }

    #[tokio::test]
    async fn test_indexing_marks_graph_dirty() {
        let engine = test_engine();
        engine
            .index(vec![chunk_input("a.rs", Some("f"), "fn f() {}")])
            .await
            .unwrap();
        engine.compute_relationships(&[]).await.unwrap();

        engine
            .index(vec![chunk_input("b.rs", Some("g"), "fn g() { f() }")])
            .await
            .unwrap();
        // New content invalidated the graph; old snapshot still served.
        let rels = engine.symbol_relationships("f").unwrap();
        assert!(rels.callers.is_empty(), "stale snapshot until recompute");

        engine.compute_relationships(&[]).await.unwrap();
        let rels = engine.symbol_relationships("f").unwrap();
        assert_eq!(rels.callers.len(), 1);
    }

    #[tokio::test]
    async fn test_graph_snapshot_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("graph.json");

        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 1;
        config.graph_snapshot_path = Some(snapshot.to_string_lossy().into_owned());
        let backend =
            crate::vector::memory::InMemoryVectorBackend::new(Arc::new(HashedEmbedder::default()));
        let engine = Engine::new(config.clone(), Arc::new(backend)).unwrap();

        engine
            .index(vec![
                chunk_input("a.rs", Some("f"), "fn f() { g() }"),
                chunk_input("b.rs", Some("g"), "fn g() {}"),
            ])
            .await
            .unwrap();
        engine.compute_relationships(&[]).await.unwrap();
        assert!(snapshot.exists());

        // A fresh engine over the same corpus restores the graph without
        // recomputing.
        let backend =
            crate::vector::memory::InMemoryVectorBackend::new(Arc::new(HashedEmbedder::default()));
        let fresh = Engine::new(config, Arc::new(backend)).unwrap();
        fresh
            .index(vec![
                chunk_input("a.rs", Some("f"), "fn f() { g() }"),
                chunk_input("b.rs", Some("g"), "fn g() {}"),
            ])
            .await
            .unwrap();
        fresh.restore_relationships().unwrap();
        assert_eq!(fresh.relationships().edge_count(), 1);
    }

    #[tokio::test]
    async fn test_background_compute_writes_configured_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("graph.json");

        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 1;
        config.graph_snapshot_path = Some(snapshot.to_string_lossy().into_owned());
        let engine = Engine::in_memory(config).unwrap();
        engine
            .index(vec![
                chunk_input("a.rs", Some("f"), "fn f() { g() }"),
                chunk_input("b.rs", Some("g"), "fn g() {}"),
            ])
            .await
            .unwrap();

        let handle = engine.compute_relationships_background(Vec::new());
        handle.wait().await.unwrap();
        assert!(snapshot.exists(), "background path must persist like sync");
    }

    #[tokio::test]
    async fn test_detect_duplicates_through_engine() {
        let engine = test_engine();
        engine
            .index(vec![
                chunk_input("a.rs", None, "fn validate(input) { check(input) }"),
                chunk_input("b.rs", None, "fn validate(input) { check(input) }"),
            ])
            .await
            .unwrap();

        let report = engine.detect_duplicates(Some(10)).await;
        assert_eq!(report.exact.len(), 1);
        assert!(report.failed_levels.is_empty());
    }
}
