/// In-memory embedding-similarity backend.
///
/// Brute-force cosine ranking over records held behind a shared
/// `Arc<RwLock>`. Every connected handle sees the same state, the way
/// separate connections to one external service would. Embedding is
/// computed inside the backend via the configured [`Embedder`].
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::embedder::{Embedder, cosine_similarity};
use crate::error::{EngineError, EngineResult};
use crate::store::ChunkId;
use crate::vector::{
    META_HASH, META_LANGUAGE, META_PATH, VectorConnector, VectorFilter, VectorMatch, VectorRecord,
    VectorStore,
};

#[derive(Clone)]
struct StoredRecord {
    embedding: Vec<f32>,
    metadata: HashMap<String, String>,
}

type SharedState = Arc<RwLock<HashMap<ChunkId, StoredRecord>>>;

/// The backend itself. Acts as the [`VectorConnector`] the pool opens
/// handles through.
pub struct InMemoryVectorBackend {
    state: SharedState,
    embedder: Arc<dyn Embedder>,
}

impl InMemoryVectorBackend {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            state: Arc::new(RwLock::new(HashMap::new())),
            embedder,
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state.read().expect("vector state lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorConnector for InMemoryVectorBackend {
    fn connect(&self) -> EngineResult<Box<dyn VectorStore>> {
        Ok(Box::new(InMemoryVectorStore {
            state: self.state.clone(),
            embedder: self.embedder.clone(),
        }))
    }
}

/// One handle to the shared in-memory backend.
pub struct InMemoryVectorStore {
    state: SharedState,
    embedder: Arc<dyn Embedder>,
}

fn passes_filter(id: ChunkId, meta: &HashMap<String, String>, filter: Option<&VectorFilter>) -> bool {
    let Some(f) = filter else {
        return true;
    };
    if f.exclude_ids.contains(&id) {
        return false;
    }
    if let Some(prefix) = &f.path_prefix {
        if !meta.get(META_PATH).is_some_and(|p| p.starts_with(prefix.as_str())) {
            return false;
        }
    }
    if let Some(lang) = &f.language {
        if meta.get(META_LANGUAGE) != Some(lang) {
            return false;
        }
    }
    true
}

impl InMemoryVectorStore {
    fn rank(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> Vec<VectorMatch> {
        let state = self.state.read().expect("vector state lock poisoned");
        let mut matches: Vec<VectorMatch> = state
            .iter()
            .filter(|(id, rec)| passes_filter(**id, &rec.metadata, filter))
            .map(|(id, rec)| VectorMatch {
                id: *id,
                // Map cosine [-1, 1] into the documented [0, 1] range.
                similarity: (1.0 + cosine_similarity(query, &rec.embedding)) / 2.0,
                metadata: rec.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        matches
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> EngineResult<()> {
        let mut prepared = Vec::with_capacity(records.len());
        for record in records {
            let embedding = match record.embedding {
                Some(v) => v,
                None => self
                    .embedder
                    .embed(&record.document)
                    .map_err(|e| EngineError::transient("vector_upsert", e.to_string()))?,
            };
            prepared.push((
                record.id,
                StoredRecord {
                    embedding,
                    metadata: record.metadata,
                },
            ));
        }

        let mut state = self.state.write().expect("vector state lock poisoned");
        for (id, rec) in prepared {
            state.insert(id, rec);
        }
        Ok(())
    }

    async fn query_by_text(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> EngineResult<Vec<VectorMatch>> {
        let query = self
            .embedder
            .embed(text)
            .map_err(|e| EngineError::transient("vector_query", e.to_string()))?;
        Ok(self.rank(&query, top_k, filter))
    }

    async fn query_by_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> EngineResult<Vec<VectorMatch>> {
        Ok(self.rank(vector, top_k, filter))
    }

    async fn delete_by_path(&self, path: &str) -> EngineResult<usize> {
        let mut state = self.state.write().expect("vector state lock poisoned");
        let before = state.len();
        state.retain(|_, rec| rec.metadata.get(META_PATH).map(String::as_str) != Some(path));
        Ok(before - state.len())
    }

    async fn get_by_hash(&self, hash: &str) -> EngineResult<Option<VectorMatch>> {
        let state = self.state.read().expect("vector state lock poisoned");
        Ok(state
            .iter()
            .find(|(_, rec)| rec.metadata.get(META_HASH).map(String::as_str) == Some(hash))
            .map(|(id, rec)| VectorMatch {
                id: *id,
                similarity: 1.0,
                metadata: rec.metadata.clone(),
            }))
    }

    async fn get_embedding(&self, id: ChunkId) -> EngineResult<Option<Vec<f32>>> {
        let state = self.state.read().expect("vector state lock poisoned");
        Ok(state.get(&id).map(|rec| rec.embedding.clone()))
    }
}
