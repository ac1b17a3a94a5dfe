//! # codescope — Hybrid Retrieval & Relationship Engine
//!
//! Indexes parsed source chunks and answers three classes of queries over
//! them: hybrid lexical+vector search, symbol call-graph lookup, and
//! duplicate-code detection. Parsing, transport, and CLI concerns live in
//! external collaborators; this crate is the engine they call into.
//!
//! ## Architecture
//!
//! - **[`config`]** — Configuration loading, validation, and defaults
//! - **[`store`]** — In-memory chunk store with content-hash identity
//! - **[`index`]** — BM25 lexical index with copy-on-write snapshots
//! - **[`embedder`]** — Embedding trait and feature-hashing implementation
//! - **[`vector`]** — Vector store client contract, in-memory backend, and
//!   the bounded connection pool
//! - **[`engine`]** — Search orchestrator and the operations exposed upward
//! - **[`relations`]** — Caller/callee graph with background recomputation
//! - **[`dedup`]** — Exact / structural / semantic duplicate detection
//! - **[`context`]** — LRU file-line cache for result context enrichment
//! - **[`rerank`]** — Optional second-pass result scoring
//! - **[`resilience`]** — Retry/backoff executor for external calls
//! - **[`error`]** — Engine error taxonomy

pub mod config;
pub mod context;
pub mod dedup;
pub mod embedder;
pub mod engine;
pub mod error;
pub mod index;
pub mod relations;
pub mod rerank;
pub mod resilience;
pub mod store;
pub mod vector;
