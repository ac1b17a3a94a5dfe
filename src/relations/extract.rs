/// Call-expression extraction from chunk content.
///
/// Known languages go through tree-sitter call queries; anything else
/// falls back to a conservative `name(` regex. Either way the output is a
/// deduplicated list of called names in first-occurrence order.
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};

use super::languages::LanguageConfig;
use crate::error::{EngineError, EngineResult};

/// Language builtins that show up as call targets but never resolve to a
/// chunk. Skipped to keep the graph useful.
const BUILTINS: &[&str] = &[
    "len", "make", "append", "delete", "print", "println", "panic", "recover", "range", "return",
    "break", "continue", "str", "int", "isinstance", "super", "format", "vec",
];

static FALLBACK_CALL: LazyLock<Regex> = LazyLock::new(|| {
    // Identifier directly followed by an open paren, skipping definition
    // keywords handled below.
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("fallback call regex is valid")
});

/// Keywords that precede a parenthesis without being calls.
const FALLBACK_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "match", "fn", "func", "def", "function", "catch", "return",
];

pub struct CallExtractor {
    call_queries: HashMap<String, Query>,
}

impl CallExtractor {
    pub fn new() -> EngineResult<Self> {
        let mut call_queries = HashMap::new();
        for config in LanguageConfig::get_all() {
            let query = Query::new(&config.language, config.call_query)
                .map_err(|e| EngineError::CorruptIndex(format!("call query ({}): {e}", config.name)))?;
            call_queries.insert(config.name.to_string(), query);
        }
        Ok(Self { call_queries })
    }

    /// Extract called names from `content`, deduplicated in
    /// first-occurrence order.
    pub fn extract_calls(&self, content: &str, language: &str) -> Vec<String> {
        match LanguageConfig::get_by_name(language) {
            Some(config) => self.extract_with_tree_sitter(content, &config, language),
            None => Self::extract_with_regex(content),
        }
    }

    fn extract_with_tree_sitter(
        &self,
        content: &str,
        config: &LanguageConfig,
        language: &str,
    ) -> Vec<String> {
        let Some(query) = self.call_queries.get(language) else {
            return Self::extract_with_regex(content);
        };

        let mut parser = Parser::new();
        if parser.set_language(&config.language).is_err() {
            return Self::extract_with_regex(content);
        }
        let Some(tree) = parser.parse(content, None) else {
            return Self::extract_with_regex(content);
        };

        let source = content.as_bytes();
        let mut cursor = QueryCursor::new();
        let mut seen = HashSet::new();
        let mut calls = Vec::new();

        let mut matches = cursor.matches(query, tree.root_node(), source);
        while let Some(m) = matches.next() {
            for cap in m.captures {
                let Ok(name) = cap.node.utf8_text(source) else {
                    continue;
                };
                let clean = name.trim();
                if clean.is_empty() || BUILTINS.contains(&clean) {
                    continue;
                }
                if seen.insert(clean.to_string()) {
                    calls.push(clean.to_string());
                }
            }
        }

        calls
    }

    fn extract_with_regex(content: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut calls = Vec::new();
        for cap in FALLBACK_CALL.captures_iter(content) {
            let name = &cap[1];
            if FALLBACK_KEYWORDS.contains(&name) || BUILTINS.contains(&name) {
                continue;
            }
            if seen.insert(name.to_string()) {
                calls.push(name.to_string());
            }
        }
        calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_rust_calls() {
        let extractor = CallExtractor::new().unwrap();
        let source = r#"
            fn process(input: &str) {
                let parsed = parse_header(input);
                validate(parsed);
                self.emit(parsed);
            }
        "#;
        let calls = extractor.extract_calls(source, "rust");
        assert!(calls.contains(&"parse_header".to_string()));
        assert!(calls.contains(&"validate".to_string()));
        assert!(calls.contains(&"emit".to_string()));
    }

    #[test]
    fn test_extract_python_calls() {
        let extractor = CallExtractor::new().unwrap();
        let source = "def handler(req):\n    data = decode(req)\n    store.save(data)\n";
        let calls = extractor.extract_calls(source, "python");
        assert!(calls.contains(&"decode".to_string()));
        assert!(calls.contains(&"save".to_string()));
    }

    #[test]
    fn test_builtins_skipped() {
        let extractor = CallExtractor::new().unwrap();
        let source = "func run(xs []int) { n := len(xs); process(xs) }";
        let calls = extractor.extract_calls(source, "go");
        assert!(!calls.contains(&"len".to_string()));
        assert!(calls.contains(&"process".to_string()));
    }

    #[test]
    fn test_unknown_language_uses_fallback() {
        let extractor = CallExtractor::new().unwrap();
        let source = "PROCEDURE main IS BEGIN compute_total(x); END";
        let calls = extractor.extract_calls(source, "ada");
        assert_eq!(calls, vec!["compute_total".to_string()]);
    }

    #[test]
    fn test_fallback_skips_keywords() {
        let calls = CallExtractor::extract_with_regex("if (ready) { launch(rocket) }");
        assert_eq!(calls, vec!["launch".to_string()]);
    }

    #[test]
    fn test_deduplicates_preserving_order() {
        let extractor = CallExtractor::new().unwrap();
        let source = "fn f() { a(); b(); a(); }";
        let calls = extractor.extract_calls(source, "rust");
        assert_eq!(calls, vec!["a".to_string(), "b".to_string()]);
    }
}
