/// Error taxonomy for the retrieval engine.
///
/// Every failure that crosses a stage boundary is wrapped with the stage
/// name before surfacing. Only [`EngineError::TransientBackend`] is
/// retryable; everything else propagates on first occurrence.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A timeout or transient connection failure against an external
    /// resource. The resilience wrapper retries these.
    #[error("{stage}: transient backend failure: {message}")]
    TransientBackend { stage: String, message: String },

    /// The connection pool had no free handle within the acquire timeout.
    /// Terminal for the call, not for the pool.
    #[error("connection pool exhausted after {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    /// A symbol, chunk, or file the caller named does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The stored index or graph snapshot is internally inconsistent.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// The reranker or embedding model is unreachable. Non-fatal: search
    /// degrades instead of failing.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Construct a retryable backend error for the given pipeline stage.
    pub fn transient(stage: &str, message: impl Into<String>) -> Self {
        Self::TransientBackend {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// Whether the resilience wrapper may retry this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientBackend { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(EngineError::transient("vector", "timeout").is_retryable());
        assert!(!EngineError::PoolExhausted { waited_ms: 100 }.is_retryable());
        assert!(!EngineError::NotFound("foo".into()).is_retryable());
        assert!(!EngineError::CorruptIndex("bad".into()).is_retryable());
        assert!(!EngineError::ModelUnavailable("down".into()).is_retryable());
    }

    #[test]
    fn test_stage_in_message() {
        let err = EngineError::transient("vector_query", "connection reset");
        let msg = err.to_string();
        assert!(msg.contains("vector_query"), "stage missing from: {msg}");
        assert!(msg.contains("connection reset"));
    }
}
