/// Bounded connection pool for vector store handles.
///
/// The pool owns N slots circulating through an mpsc channel. A slot is
/// either a live handle or empty; empty slots are connected lazily on
/// acquire, which is also how a handle discarded after a backend error is
/// replaced (tolerating backend restarts). `acquire` never blocks past the
/// configured timeout: it fails with [`EngineError::PoolExhausted`]
/// instead of deadlocking callers.
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::vector::{VectorConnector, VectorStore};

type Slot = Option<Box<dyn VectorStore>>;

pub struct VectorPool {
    connector: Arc<dyn VectorConnector>,
    tx: mpsc::Sender<Slot>,
    rx: Mutex<mpsc::Receiver<Slot>>,
    acquire_timeout: Duration,
    size: usize,
}

impl VectorPool {
    /// Create a pool of `size` lazily-connected slots.
    pub fn new(
        connector: Arc<dyn VectorConnector>,
        size: usize,
        acquire_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(size.max(1));
        for _ in 0..size.max(1) {
            // Fill with empty slots; connections are opened on first use.
            tx.try_send(None).expect("pool channel sized to capacity");
        }
        Self {
            connector,
            tx,
            rx: Mutex::new(rx),
            acquire_timeout,
            size: size.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Acquire a handle, waiting at most the configured timeout.
    ///
    /// An empty slot triggers a lazy connect; if connecting fails, the slot
    /// goes back to the pool and the connector's error propagates, so one
    /// bad connection attempt never shrinks the pool.
    pub async fn acquire(&self) -> EngineResult<PooledVectorStore> {
        let started = Instant::now();

        let slot = tokio::time::timeout(self.acquire_timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await
        .map_err(|_| EngineError::PoolExhausted {
            waited_ms: started.elapsed().as_millis() as u64,
        })?
        .ok_or_else(|| EngineError::CorruptIndex("vector pool channel closed".to_string()))?;

        let conn = match slot {
            Some(conn) => conn,
            None => match self.connector.connect() {
                Ok(conn) => {
                    debug!("opened new vector store handle");
                    conn
                }
                Err(e) => {
                    // Return the empty slot before surfacing the error.
                    let _ = self.tx.try_send(None);
                    return Err(e);
                }
            },
        };

        Ok(PooledVectorStore {
            conn: Some(conn),
            broken: false,
            tx: self.tx.clone(),
        })
    }
}

/// RAII guard over a pooled handle. The slot returns to the pool on drop
/// even when the guarded operation failed; a handle marked broken is
/// dropped and its slot goes back empty.
pub struct PooledVectorStore {
    conn: Option<Box<dyn VectorStore>>,
    broken: bool,
    tx: mpsc::Sender<Slot>,
}

impl PooledVectorStore {
    pub fn store(&self) -> &dyn VectorStore {
        self.conn
            .as_deref()
            .expect("pooled connection accessed after drop")
    }

    /// Discard this handle on return. The next acquire of its slot
    /// reconnects lazily.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Drop for PooledVectorStore {
    fn drop(&mut self) {
        let slot = if self.broken {
            warn!("discarding broken vector store handle");
            None
        } else {
            self.conn.take()
        };
        // Capacity equals the number of outstanding slots, so this cannot
        // fail while the pool is alive.
        let _ = self.tx.try_send(slot);
    }
}
