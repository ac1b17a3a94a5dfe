/// Context enrichment service.
///
/// Attaches surrounding source lines to search results through a bounded
/// LRU cache of file line vectors. All cache mutation (inserts, evictions,
/// touches) goes through one mutex, giving concurrent touches a single
/// deterministic total order.
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use tracing::debug;

/// Strict least-recently-used cache of `path → lines`.
///
/// A read counts as a touch: reading an entry immediately before an
/// evicting insert protects it.
pub struct LruFileCache {
    capacity: usize,
    inner: Mutex<LruInner>,
}

#[derive(Default)]
struct LruInner {
    map: HashMap<String, Vec<String>>,
    /// Recency order, least-recent first.
    order: VecDeque<String>,
}

impl LruFileCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LruInner::default()),
        }
    }

    fn touch(order: &mut VecDeque<String>, path: &str) {
        if let Some(pos) = order.iter().position(|p| p == path) {
            order.remove(pos);
        }
        order.push_back(path.to_string());
    }

    /// Look up cached lines, marking the entry most-recently used.
    pub fn get(&self, path: &str) -> Option<Vec<String>> {
        let mut inner = self.inner.lock().expect("file cache lock poisoned");
        let lines = inner.map.get(path).cloned()?;
        Self::touch(&mut inner.order, path);
        Some(lines)
    }

    /// Insert lines for a path, evicting the least-recently-used entry
    /// when at capacity.
    pub fn insert(&self, path: &str, lines: Vec<String>) {
        let mut inner = self.inner.lock().expect("file cache lock poisoned");
        if !inner.map.contains_key(path) && inner.map.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                debug!("evicting cached file lines: {evicted}");
                inner.map.remove(&evicted);
            }
        }
        inner.map.insert(path.to_string(), lines);
        Self::touch(&mut inner.order, path);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("file cache lock poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Surrounding lines for one result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkContext {
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Reads ±N lines around a chunk via the LRU cache.
pub struct ContextService {
    cache: LruFileCache,
    context_lines: usize,
}

impl ContextService {
    #[must_use]
    pub fn new(cache_capacity: usize, context_lines: usize) -> Self {
        Self {
            cache: LruFileCache::new(cache_capacity),
            context_lines,
        }
    }

    /// Lines surrounding the 1-based `[start_line, end_line]` range.
    ///
    /// Returns `None` when the source file is missing or unreadable; the
    /// caller signals that via `file_missing` instead of failing.
    pub fn surrounding(
        &self,
        path: &str,
        start_line: usize,
        end_line: usize,
    ) -> Option<ChunkContext> {
        let lines = match self.cache.get(path) {
            Some(lines) => lines,
            None => {
                let content = std::fs::read_to_string(Path::new(path)).ok()?;
                let lines: Vec<String> = content.lines().map(str::to_string).collect();
                self.cache.insert(path, lines.clone());
                lines
            }
        };

        let start_idx = start_line.saturating_sub(1).min(lines.len());
        let before_from = start_idx.saturating_sub(self.context_lines);
        let after_from = end_line.min(lines.len());
        let after_to = (end_line + self.context_lines).min(lines.len());

        Some(ChunkContext {
            before: lines[before_from..start_idx].to_vec(),
            after: lines[after_from..after_to].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = LruFileCache::new(2);
        cache.insert("a", lines(&["a"]));
        cache.insert("b", lines(&["b"]));
        cache.insert("c", lines(&["c"]));

        assert!(cache.get("a").is_none(), "a was least-recent and evicted");
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_read_counts_as_touch() {
        let cache = LruFileCache::new(2);
        cache.insert("a", lines(&["a"]));
        cache.insert("b", lines(&["b"]));

        // Touch a right before the evicting insert: b goes instead.
        assert!(cache.get("a").is_some());
        cache.insert("c", lines(&["c"]));

        assert!(cache.get("a").is_some(), "touched entry survives");
        assert!(cache.get("b").is_none(), "untouched entry evicted");
    }

    #[test]
    fn test_reinsert_same_key_no_eviction() {
        let cache = LruFileCache::new(2);
        cache.insert("a", lines(&["a1"]));
        cache.insert("b", lines(&["b"]));
        cache.insert("a", lines(&["a2"]));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap(), lines(&["a2"]));
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_surrounding_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("source.rs");
        let content = (1..=10)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&path, content).unwrap();

        let service = ContextService::new(4, 3);
        let ctx = service
            .surrounding(path.to_str().unwrap(), 5, 6)
            .expect("file exists");

        assert_eq!(ctx.before, lines(&["line 2", "line 3", "line 4"]));
        assert_eq!(ctx.after, lines(&["line 7", "line 8", "line 9"]));
    }

    #[test]
    fn test_surrounding_clamps_at_file_edges() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.rs");
        fs::write(&path, "one\ntwo\nthree").unwrap();

        let service = ContextService::new(4, 3);
        let ctx = service.surrounding(path.to_str().unwrap(), 1, 3).unwrap();
        assert!(ctx.before.is_empty());
        assert!(ctx.after.is_empty());
    }

    #[test]
    fn test_missing_file_returns_none() {
        let service = ContextService::new(4, 3);
        assert!(service.surrounding("/no/such/file.rs", 1, 5).is_none());
    }

    #[test]
    fn test_cached_file_served_without_filesystem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.rs");
        fs::write(&path, "a\nb\nc\nd\ne").unwrap();

        let service = ContextService::new(4, 1);
        let p = path.to_str().unwrap().to_string();
        assert!(service.surrounding(&p, 3, 3).is_some());

        // Delete the file; the cached lines still answer.
        fs::remove_file(&path).unwrap();
        let ctx = service.surrounding(&p, 3, 3).unwrap();
        assert_eq!(ctx.before, lines(&["b"]));
        assert_eq!(ctx.after, lines(&["d"]));
    }
}
