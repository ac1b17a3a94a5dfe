/// Relationship store: the caller→callee graph over the chunk corpus.
///
/// One graph per store, replaced atomically on recomputation. The state
/// machine is Clean → (invalidate) → Dirty → (recompute) → Clean; a dirty
/// store keeps serving its last valid snapshot until the next
/// recomputation lands, so readers never see a half-built graph.
pub mod extract;
pub mod languages;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::store::{Chunk, ChunkId, ChunkStore};
use extract::CallExtractor;

/// Immutable snapshot of the caller index: callee chunk id → caller chunk
/// ids. Only edges whose endpoints existed at build time are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipGraph {
    pub callers: HashMap<ChunkId, Vec<ChunkId>>,
    pub computed_at: DateTime<Utc>,
}

impl Default for RelationshipGraph {
    fn default() -> Self {
        Self {
            callers: HashMap::new(),
            computed_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl RelationshipGraph {
    pub fn edge_count(&self) -> usize {
        self.callers.values().map(Vec::len).sum()
    }
}

/// Resolved relationships for one symbol.
#[derive(Debug, Clone)]
pub struct SymbolRelationships {
    pub definition: Arc<Chunk>,
    pub callers: Vec<Arc<Chunk>>,
    pub callees: Vec<Arc<Chunk>>,
}

/// Handle for a background recomputation. Await it for the resulting
/// snapshot; the store itself is only guaranteed to reflect the result
/// after the handle resolves (eventually consistent — poll `load`).
pub struct ComputeHandle {
    inner: JoinHandle<EngineResult<Arc<RelationshipGraph>>>,
}

impl ComputeHandle {
    pub async fn wait(self) -> EngineResult<Arc<RelationshipGraph>> {
        match self.inner.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(EngineError::transient(
                "relationship_compute",
                "background task cancelled",
            )),
            Err(e) => Err(EngineError::CorruptIndex(format!(
                "background compute panicked: {e}"
            ))),
        }
    }
}

pub struct RelationshipStore {
    chunks: Arc<ChunkStore>,
    extractor: Arc<CallExtractor>,
    snapshot: RwLock<Arc<RelationshipGraph>>,
    dirty: AtomicBool,
    /// Serializes recomputations: at most one executes at a time, and when
    /// several are scheduled the last to complete performs the final swap.
    compute_lock: Arc<tokio::sync::Mutex<()>>,
    cancel: CancellationToken,
}

impl RelationshipStore {
    pub fn new(chunks: Arc<ChunkStore>) -> EngineResult<Self> {
        Ok(Self {
            chunks,
            extractor: Arc::new(CallExtractor::new()?),
            snapshot: RwLock::new(Arc::new(RelationshipGraph::default())),
            dirty: AtomicBool::new(true),
            compute_lock: Arc::new(tokio::sync::Mutex::new(())),
            cancel: CancellationToken::new(),
        })
    }

    /// Mark the graph stale without clearing it. Reads keep serving the
    /// previous snapshot until the next recomputation completes.
    pub fn invalidate(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        debug!("relationship graph invalidated");
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Current snapshot (clean or stale). Never triggers recomputation.
    pub fn load(&self) -> Arc<RelationshipGraph> {
        self.snapshot
            .read()
            .expect("relationship snapshot lock poisoned")
            .clone()
    }

    /// Cancel in-flight background recomputation; partial work is
    /// discarded, never swapped in.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Recompute synchronously and swap the snapshot in.
    ///
    /// An empty `changed_paths` rebuilds the full graph; otherwise only
    /// edges sourced from chunks under the changed paths are rebuilt and
    /// the rest carry over (dangling edges pruned either way).
    pub async fn compute(&self, changed_paths: &[String]) -> EngineResult<Arc<RelationshipGraph>> {
        let _guard = self.compute_lock.lock().await;
        let previous = self.load();
        let graph = Arc::new(self.build_graph(&previous, changed_paths, &self.cancel)?);

        *self
            .snapshot
            .write()
            .expect("relationship snapshot lock poisoned") = graph.clone();
        self.dirty.store(false, Ordering::SeqCst);

        info!(
            "relationship graph recomputed: {} callees, {} edges",
            graph.callers.len(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Schedule recomputation on the runtime and return immediately. When
    /// a snapshot path is given, the result is persisted there after the
    /// swap, same as the synchronous path.
    ///
    /// Scheduled computations are serialized; callers that need the result
    /// await the handle and then `load()` — the return of this call
    /// guarantees nothing about store contents.
    pub fn compute_background(
        self: &Arc<Self>,
        changed_paths: Vec<String>,
        snapshot_path: Option<PathBuf>,
    ) -> ComputeHandle {
        let store = self.clone();
        let inner = tokio::spawn(async move {
            let graph = store.compute(&changed_paths).await?;
            if let Some(path) = snapshot_path {
                store.save_to(&path)?;
            }
            Ok(graph)
        });
        ComputeHandle { inner }
    }

    fn build_graph(
        &self,
        previous: &RelationshipGraph,
        changed_paths: &[String],
        cancel: &CancellationToken,
    ) -> EngineResult<RelationshipGraph> {
        let all = self.chunks.all();
        let scoped = !changed_paths.is_empty();

        let mut callers: HashMap<ChunkId, Vec<ChunkId>> = HashMap::new();

        if scoped {
            // Carry over edges from unchanged sources, pruning anything
            // that now dangles.
            let changed = |chunk: &Chunk| changed_paths.iter().any(|p| chunk.path == *p);
            for (callee, sources) in &previous.callers {
                if self.chunks.get(*callee).is_none() {
                    continue;
                }
                let kept: Vec<ChunkId> = sources
                    .iter()
                    .filter(|id| {
                        self.chunks
                            .get(**id)
                            .is_some_and(|chunk| !changed(&chunk))
                    })
                    .copied()
                    .collect();
                if !kept.is_empty() {
                    callers.insert(*callee, kept);
                }
            }
        }

        for chunk in &all {
            if cancel.is_cancelled() {
                return Err(EngineError::transient(
                    "relationship_compute",
                    "recomputation cancelled",
                ));
            }
            if scoped && !changed_paths.iter().any(|p| chunk.path == *p) {
                continue;
            }

            for call in self.extractor.extract_calls(&chunk.content, &chunk.language) {
                // First exact-name match wins; unresolved names produce no
                // edge, so the graph never references a missing chunk.
                let Some(target) = self.chunks.resolve_name(&call) else {
                    continue;
                };
                let sources = callers.entry(target.id).or_default();
                if !sources.contains(&chunk.id) {
                    sources.push(chunk.id);
                }
            }
        }

        Ok(RelationshipGraph {
            callers,
            computed_at: Utc::now(),
        })
    }

    /// Resolve a symbol to its definition, recorded callers, and
    /// on-demand callees.
    ///
    /// Callees are re-extracted from the definition's stored content and
    /// resolved against the corpus at call time; they are never persisted.
    pub fn symbol_relationships(&self, name: &str) -> EngineResult<SymbolRelationships> {
        let definition = self
            .chunks
            .resolve_name(name)
            .ok_or_else(|| EngineError::NotFound(format!("symbol '{name}'")))?;

        let graph = self.load();
        let callers: Vec<Arc<Chunk>> = graph
            .callers
            .get(&definition.id)
            .map(|ids| ids.iter().filter_map(|id| self.chunks.get(*id)).collect())
            .unwrap_or_default();

        let mut callees = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for call in self
            .extractor
            .extract_calls(&definition.content, &definition.language)
        {
            if let Some(target) = self.chunks.resolve_name(&call) {
                if seen.insert(target.id) {
                    callees.push(target);
                }
            }
        }

        Ok(SymbolRelationships {
            definition,
            callers,
            callees,
        })
    }

    // ── Snapshot persistence ─────────────────────────────────────────

    /// Write the current snapshot as one JSON document, atomically via
    /// temp-file rename.
    pub fn save_to(&self, path: &Path) -> EngineResult<()> {
        let graph = self.load();
        let data = serde_json::to_vec_pretty(graph.as_ref())
            .map_err(|e| EngineError::CorruptIndex(format!("serialize graph: {e}")))?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        debug!("relationship snapshot saved to {}", path.display());
        Ok(())
    }

    /// Replace the in-memory snapshot from a persisted file.
    pub fn load_from(&self, path: &Path) -> EngineResult<()> {
        let data = std::fs::read_to_string(path)?;
        let graph: RelationshipGraph = serde_json::from_str(&data)
            .map_err(|e| EngineError::CorruptIndex(format!("parse graph snapshot: {e}")))?;

        *self
            .snapshot
            .write()
            .expect("relationship snapshot lock poisoned") = Arc::new(graph);
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }
}
