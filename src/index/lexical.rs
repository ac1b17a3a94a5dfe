/// In-memory BM25 index over chunk text.
///
/// Documents and chunk ids live in parallel insertion-ordered collections.
/// Writers rebuild a copy-on-write snapshot that becomes visible to new
/// queries atomically; in-flight searches keep reading the snapshot they
/// started with.
///
/// `add` recomputes corpus statistics and is O(n) in the number of indexed
/// documents. That is acceptable for batch indexing; heavy single-chunk
/// incremental update workloads should batch their adds.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::store::ChunkId;

// Standard BM25 parameters: k1 saturates term frequency, b applies
// document-length normalization.
const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Lowercase word-boundary tokenization. Underscores join identifier
/// tokens the way they do in source code.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Clone)]
struct DocEntry {
    chunk_id: ChunkId,
    term_freq: HashMap<String, f32>,
    length: f32,
}

#[derive(Default, Clone)]
struct LexicalInner {
    docs: Vec<DocEntry>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub chunk_id: ChunkId,
    pub score: f32,
}

#[derive(Default)]
pub struct LexicalIndex {
    inner: RwLock<Arc<LexicalInner>>,
}

impl LexicalIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index (or re-index) the text for a chunk.
    pub fn add(&self, chunk_id: ChunkId, text: &str) {
        let tokens = tokenize(text);
        let mut term_freq: HashMap<String, f32> = HashMap::new();
        for token in &tokens {
            *term_freq.entry(token.clone()).or_insert(0.0) += 1.0;
        }
        let entry = DocEntry {
            chunk_id,
            term_freq,
            length: tokens.len() as f32,
        };

        let mut guard = self.inner.write().expect("lexical index lock poisoned");
        let mut next = LexicalInner {
            docs: guard.docs.clone(),
            ..Default::default()
        };

        match next.docs.iter_mut().find(|d| d.chunk_id == chunk_id) {
            Some(existing) => *existing = entry,
            None => next.docs.push(entry),
        }

        // Full recompute of corpus statistics.
        let mut total_len = 0.0;
        for doc in &next.docs {
            total_len += doc.length;
            for term in doc.term_freq.keys() {
                *next.doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }
        next.avg_doc_len = if next.docs.is_empty() {
            0.0
        } else {
            total_len / next.docs.len() as f32
        };

        *guard = Arc::new(next);
    }

    pub fn len(&self) -> usize {
        self.snapshot().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<LexicalInner> {
        self.inner
            .read()
            .expect("lexical index lock poisoned")
            .clone()
    }

    /// Score all documents against the query terms and return the top `k`
    /// by descending BM25 score. Ties keep original insertion order.
    pub fn search(&self, terms: &[String], top_k: usize) -> Vec<LexicalHit> {
        let inner = self.snapshot();
        if inner.docs.is_empty() || terms.is_empty() {
            return Vec::new();
        }

        let n = inner.docs.len() as f32;
        let mut hits = Vec::new();

        for doc in &inner.docs {
            let mut score = 0.0f32;
            for term in terms {
                let Some(&tf) = doc.term_freq.get(term) else {
                    continue;
                };
                let df = *inner.doc_freq.get(term).unwrap_or(&0) as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                let norm = K1 * (1.0 - B + B * doc.length / inner.avg_doc_len.max(1.0));
                score += idf * (tf * (K1 + 1.0)) / (tf + norm);
            }
            if score > 0.0 {
                hits.push(LexicalHit {
                    chunk_id: doc.chunk_id,
                    score,
                });
            }
        }

        // sort_by is stable, so equal scores keep insertion order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }
}
