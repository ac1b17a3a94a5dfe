/// Query normalization and synonym expansion.
///
/// A raw query is collapsed, lowercased, and split into terms; terms found
/// in the fixed synonym table append their expansions. The output keeps
/// first-seen order with duplicates removed, so expansion never reorders
/// what the user actually typed.
use std::collections::HashSet;

/// Fixed expansion table. Keys and expansions are already lowercase.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("auth", &["login", "authentication", "credential"]),
    ("login", &["auth", "signin", "session"]),
    ("db", &["database", "storage"]),
    ("config", &["configuration", "settings"]),
    ("settings", &["config", "configuration"]),
    ("error", &["exception", "failure"]),
    ("delete", &["remove", "drop"]),
    ("create", &["new", "init", "insert"]),
    ("fetch", &["get", "retrieve", "load"]),
    ("send", &["publish", "emit", "dispatch"]),
    ("parse", &["decode", "deserialize"]),
    ("serialize", &["encode", "marshal"]),
    ("cache", &["lru", "memoize"]),
    ("async", &["concurrent", "parallel"]),
];

#[derive(Debug, Clone)]
pub struct QueryProcessor {
    expand: bool,
}

impl QueryProcessor {
    #[must_use]
    pub fn new(expand: bool) -> Self {
        Self { expand }
    }

    /// Normalize a raw query into a deduplicated, optionally expanded term
    /// list.
    pub fn process(&self, raw: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut terms: Vec<String> = Vec::new();

        let push = |term: &str, seen: &mut HashSet<String>, terms: &mut Vec<String>| {
            if !term.is_empty() && seen.insert(term.to_string()) {
                terms.push(term.to_string());
            }
        };

        let base: Vec<String> = raw
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        for term in &base {
            push(term, &mut seen, &mut terms);
            if self.expand {
                if let Some((_, expansions)) = SYNONYMS.iter().find(|(k, _)| k == term) {
                    for expansion in *expansions {
                        push(expansion, &mut seen, &mut terms);
                    }
                }
            }
        }

        terms
    }
}
