/// Chunk model and in-memory chunk store.
///
/// Chunks are produced by an external parsing collaborator and handed to
/// the engine as [`ChunkInput`] records. The store assigns stable ids,
/// derives content hashes, and maintains the lookup indexes the rest of
/// the engine reads (by id, by hash, by symbol name).
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

pub type ChunkId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Method,
    Class,
    Block,
    Other,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
            ChunkKind::Class => "class",
            ChunkKind::Block => "block",
            ChunkKind::Other => "other",
        }
    }
}

/// A chunk record as supplied by the external parser.
#[derive(Debug, Clone)]
pub struct ChunkInput {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub content: String,
    pub name: Option<String>,
    pub kind: ChunkKind,
}

/// A stored chunk with its assigned id and content hash.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub content: String,
    pub content_hash: String,
    pub name: Option<String>,
    pub kind: ChunkKind,
}

/// Compute the deterministic content hash of a chunk.
///
/// The hash is a pure function of whitespace-normalized content: the same
/// content always yields the same hash, regardless of indentation style or
/// line endings.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    for token in content.split_whitespace() {
        token.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

#[derive(Default)]
struct StoreInner {
    /// Chunks in insertion order. Name resolution is first-match over this
    /// order, so it must be stable.
    order: Vec<ChunkId>,
    by_id: HashMap<ChunkId, Arc<Chunk>>,
    /// (path, start_line, end_line) → id. Re-indexing the same location
    /// updates in place instead of duplicating.
    by_location: HashMap<(String, usize, usize), ChunkId>,
    by_name: HashMap<String, Vec<ChunkId>>,
    next_id: ChunkId,
}

/// Outcome of a single chunk upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
    Unchanged,
}

/// In-memory content-addressed chunk store.
///
/// Concurrent reads are lock-shared; writes take the exclusive lock for the
/// duration of the index update only.
#[derive(Default)]
pub struct ChunkStore {
    inner: RwLock<StoreInner>,
}

impl ChunkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a chunk. Identity is (path, line range); an
    /// unchanged content hash at the same location is a no-op.
    pub fn upsert(&self, input: ChunkInput) -> (ChunkId, UpsertOutcome) {
        let hash = content_hash(&input.content);
        let key = (input.path.clone(), input.start_line, input.end_line);

        let mut inner = self.inner.write().expect("chunk store lock poisoned");

        if let Some(&id) = inner.by_location.get(&key) {
            let existing = inner.by_id.get(&id).cloned();
            if let Some(existing) = existing {
                if existing.content_hash == hash {
                    return (id, UpsertOutcome::Unchanged);
                }
                // Content changed at the same location: replace in place,
                // keeping the id stable.
                if let Some(old_name) = &existing.name {
                    if let Some(ids) = inner.by_name.get_mut(old_name) {
                        ids.retain(|&i| i != id);
                    }
                }
                let chunk = Arc::new(Chunk {
                    id,
                    path: input.path,
                    start_line: input.start_line,
                    end_line: input.end_line,
                    language: input.language,
                    content: input.content,
                    content_hash: hash,
                    name: input.name,
                    kind: input.kind,
                });
                if let Some(name) = &chunk.name {
                    inner.by_name.entry(name.clone()).or_default().push(id);
                }
                inner.by_id.insert(id, chunk);
                return (id, UpsertOutcome::Updated);
            }
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let chunk = Arc::new(Chunk {
            id,
            path: input.path,
            start_line: input.start_line,
            end_line: input.end_line,
            language: input.language,
            content: input.content,
            content_hash: hash,
            name: input.name,
            kind: input.kind,
        });

        inner.by_location.insert(key, id);
        if let Some(name) = &chunk.name {
            inner.by_name.entry(name.clone()).or_default().push(id);
        }
        inner.order.push(id);
        inner.by_id.insert(id, chunk);
        (id, UpsertOutcome::Added)
    }

    pub fn get(&self, id: ChunkId) -> Option<Arc<Chunk>> {
        self.inner
            .read()
            .expect("chunk store lock poisoned")
            .by_id
            .get(&id)
            .cloned()
    }

    /// All chunks in insertion order.
    pub fn all(&self) -> Vec<Arc<Chunk>> {
        let inner = self.inner.read().expect("chunk store lock poisoned");
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("chunk store lock poisoned")
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a symbol name to its defining chunk.
    ///
    /// Best-effort: when multiple chunks share a name, the first inserted
    /// wins. Resolution quality depends on corpus naming uniqueness.
    pub fn resolve_name(&self, name: &str) -> Option<Arc<Chunk>> {
        let inner = self.inner.read().expect("chunk store lock poisoned");
        inner
            .by_name
            .get(name)
            .and_then(|ids| ids.first())
            .and_then(|id| inner.by_id.get(id).cloned())
    }

    /// Whether any chunk defines the given symbol name.
    pub fn has_name(&self, name: &str) -> bool {
        let inner = self.inner.read().expect("chunk store lock poisoned");
        inner.by_name.get(name).is_some_and(|ids| !ids.is_empty())
    }

    /// Exact and prefix name matches, exact first, each group in insertion
    /// order, optionally filtered by chunk kind.
    pub fn find_symbol(&self, name: &str, kind: Option<ChunkKind>) -> Vec<Arc<Chunk>> {
        let inner = self.inner.read().expect("chunk store lock poisoned");
        let mut exact = Vec::new();
        let mut prefix = Vec::new();

        for id in &inner.order {
            let Some(chunk) = inner.by_id.get(id) else {
                continue;
            };
            let Some(chunk_name) = &chunk.name else {
                continue;
            };
            if let Some(k) = kind {
                if chunk.kind != k {
                    continue;
                }
            }
            if chunk_name == name {
                exact.push(chunk.clone());
            } else if chunk_name.starts_with(name) {
                prefix.push(chunk.clone());
            }
        }

        exact.extend(prefix);
        exact
    }

    /// First stored chunk with the given content hash.
    pub fn find_by_hash(&self, hash: &str) -> Option<Arc<Chunk>> {
        let inner = self.inner.read().expect("chunk store lock poisoned");
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id))
            .find(|c| c.content_hash == hash)
            .cloned()
    }

    /// Chunks stored under the given file path.
    pub fn chunks_for_path(&self, path: &str) -> Vec<Arc<Chunk>> {
        let inner = self.inner.read().expect("chunk store lock poisoned");
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id))
            .filter(|c| c.path == path)
            .cloned()
            .collect()
    }
}
