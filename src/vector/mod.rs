/// Vector store boundary.
///
/// The embedding-similarity backend is an external service: it owns
/// embedding computation and persistence. This module defines the client
/// contract ([`VectorStore`]), the record/match types crossing it, and the
/// connector used by the pool to open handles.
pub mod memory;
pub mod pool;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::store::ChunkId;

/// Metadata keys the engine writes alongside each record.
pub const META_PATH: &str = "path";
pub const META_HASH: &str = "hash";
pub const META_LANGUAGE: &str = "language";
pub const META_NAME: &str = "name";

/// A record handed to the backend for upsert. The embedding is optional:
/// when absent, the backend embeds `document` itself.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: ChunkId,
    pub embedding: Option<Vec<f32>>,
    pub document: String,
    pub metadata: HashMap<String, String>,
}

/// A scored match from the backend. Similarity is normalized to [0, 1].
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: ChunkId,
    pub similarity: f32,
    pub metadata: HashMap<String, String>,
}

/// Server-side filters applied before top-k truncation.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub path_prefix: Option<String>,
    pub language: Option<String>,
    /// Ids excluded from the result (used by nearest-neighbor lookups to
    /// drop the probe chunk itself).
    pub exclude_ids: Vec<ChunkId>,
}

/// One live handle to the embedding-similarity backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, records: Vec<VectorRecord>) -> EngineResult<()>;

    async fn query_by_text(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> EngineResult<Vec<VectorMatch>>;

    async fn query_by_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> EngineResult<Vec<VectorMatch>>;

    /// Delete every record whose `path` metadata matches. Returns the
    /// number of records removed.
    async fn delete_by_path(&self, path: &str) -> EngineResult<usize>;

    /// Exact lookup by content hash metadata.
    async fn get_by_hash(&self, hash: &str) -> EngineResult<Option<VectorMatch>>;

    /// The stored embedding for a record, if present.
    async fn get_embedding(&self, id: ChunkId) -> EngineResult<Option<Vec<f32>>>;
}

/// Opens handles to the backend. The pool calls this lazily whenever a
/// slot is empty, which is how discarded (broken) handles get replaced.
pub trait VectorConnector: Send + Sync {
    fn connect(&self) -> EngineResult<Box<dyn VectorStore>>;
}
