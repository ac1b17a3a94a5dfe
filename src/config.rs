/// Configuration module for codescope.
///
/// Handles loading, validating, and providing default configuration values
/// for the retrieval engine and its services.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_pool_size() -> usize {
    4
}

fn default_acquire_timeout_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_search_limit() -> usize {
    10
}

fn default_similarity_threshold() -> f32 {
    0.25
}

fn default_context_lines() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_file_cache_capacity() -> usize {
    64
}

fn default_min_duplicate_length() -> usize {
    80
}

fn default_semantic_threshold() -> f32 {
    0.9
}

fn default_dimensions() -> usize {
    384
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default = "default_file_cache_capacity")]
    pub file_cache_capacity: usize,

    #[serde(default = "default_dimensions")]
    pub embedding_dimensions: usize,

    /// Path for the relationship graph snapshot (no persistence if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_snapshot_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub size: usize,

    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    #[serde(default = "default_similarity_threshold")]
    pub default_threshold: f32,

    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    #[serde(default = "default_true")]
    pub expand_queries: bool,

    #[serde(default = "default_true")]
    pub rerank: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DedupConfig {
    #[serde(default = "default_min_duplicate_length")]
    pub min_length: usize,

    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            search: SearchConfig::default(),
            dedup: DedupConfig::default(),
            file_cache_capacity: default_file_cache_capacity(),
            embedding_dimensions: default_dimensions(),
            graph_snapshot_path: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            default_threshold: default_similarity_threshold(),
            context_lines: default_context_lines(),
            expand_queries: default_true(),
            rerank: default_true(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_duplicate_length(),
            semantic_threshold: default_semantic_threshold(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl EngineConfig {
    /// Load configuration from a JSON file.
    ///
    /// If the file does not exist, returns a default config. Invalid JSON
    /// also falls back to defaults with a warning rather than failing
    /// engine startup.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "codescope.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: EngineConfig = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.pool.size > 0, "pool.size must be positive");
        anyhow::ensure!(
            self.pool.acquire_timeout_ms > 0,
            "pool.acquire_timeout_ms must be positive"
        );
        anyhow::ensure!(
            self.retry.max_attempts > 0,
            "retry.max_attempts must be positive"
        );
        anyhow::ensure!(
            self.search.default_limit > 0,
            "search.default_limit must be positive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.search.default_threshold),
            "search.default_threshold must be in [0, 1]"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.dedup.semantic_threshold),
            "dedup.semantic_threshold must be in [0, 1]"
        );
        anyhow::ensure!(
            self.file_cache_capacity > 0,
            "file_cache_capacity must be positive"
        );
        anyhow::ensure!(
            self.embedding_dimensions > 0,
            "embedding_dimensions must be positive"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
