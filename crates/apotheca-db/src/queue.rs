//! # Persistence Queue
//!
//! Fire-and-forget write path between the (synchronous) store and SQLite.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  InventoryStore                     PersistWriter (tokio task)          │
//! │  ──────────────                     ─────────────────────────           │
//! │  handle.put(key, &value)                                                │
//! │    │ serde_json::to_string  ─► Err → mutation abandoned                │
//! │    │                                                                    │
//! │    └─► mpsc (unbounded) ──────────► kv.put(key, json)                   │
//! │                                       │                                 │
//! │                                       └─ Err → warn!, continue          │
//! │                                                                         │
//! │  handle.flush().await ────────────► replies once earlier writes landed  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes for one key are applied in the order they were queued, so the
//! last queued document is the one that survives a reload.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::kv::KvRepository;

/// One queued operation.
#[derive(Debug)]
pub enum PersistOp {
    Put { key: String, json: String },
    Remove { key: String },
    Flush(oneshot::Sender<()>),
}

impl PersistOp {
    /// Serializes `value` into a put for `key` without queueing it.
    pub fn put<T: Serialize + ?Sized>(key: &str, value: &T) -> DbResult<PersistOp> {
        let json = serde_json::to_string(value).map_err(|e| DbError::serialization(key, &e))?;
        Ok(PersistOp::Put {
            key: key.to_string(),
            json,
        })
    }
}

/// Cheap, cloneable sender side of the queue.
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl PersistHandle {
    /// Serializes `value` and queues it under `key`.
    ///
    /// Fails only when the value cannot be serialized or the writer has
    /// stopped; the database write itself is not awaited.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> DbResult<()> {
        self.submit([PersistOp::put(key, value)?])
    }

    /// Queues operations encoded beforehand, in order.
    ///
    /// Callers that must write several keys encode all of them first, so a
    /// serialization failure leaves nothing queued.
    pub fn submit(&self, ops: impl IntoIterator<Item = PersistOp>) -> DbResult<()> {
        for op in ops {
            self.tx.send(op).map_err(|_| DbError::QueueClosed)?;
        }
        Ok(())
    }

    /// Queues deletion of `key`.
    pub fn remove(&self, key: &str) -> DbResult<()> {
        self.tx
            .send(PersistOp::Remove {
                key: key.to_string(),
            })
            .map_err(|_| DbError::QueueClosed)
    }

    /// Waits until every operation queued before this call has been applied.
    pub async fn flush(&self) -> DbResult<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(PersistOp::Flush(tx))
            .map_err(|_| DbError::QueueClosed)?;
        rx.await.map_err(|_| DbError::QueueClosed)
    }

    /// A handle whose operations land in the returned receiver (tests).
    pub fn detached() -> (PersistHandle, mpsc::UnboundedReceiver<PersistOp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PersistHandle { tx }, rx)
    }
}

/// Background task applying queued operations.
pub struct PersistWriter {
    kv: KvRepository,
    rx: mpsc::UnboundedReceiver<PersistOp>,
}

impl PersistWriter {
    /// Spawns the writer and returns the handle feeding it.
    ///
    /// The task ends once every handle has been dropped and the queue is
    /// drained.
    pub fn spawn(kv: KvRepository) -> (PersistHandle, JoinHandle<()>) {
        let (handle, rx) = PersistHandle::detached();
        let writer = PersistWriter { kv, rx };
        let task = tokio::spawn(writer.run());
        (handle, task)
    }

    async fn run(mut self) {
        info!("Persistence writer starting");

        while let Some(op) = self.rx.recv().await {
            match op {
                PersistOp::Put { key, json } => {
                    if let Err(e) = self.kv.put(&key, &json).await {
                        warn!(key = %key, error = %e, "Persist write failed");
                    }
                }
                PersistOp::Remove { key } => {
                    if let Err(e) = self.kv.remove(&key).await {
                        warn!(key = %key, error = %e, "Persist delete failed");
                    }
                }
                PersistOp::Flush(reply) => {
                    debug!("Persistence queue flushed");
                    let _ = reply.send(());
                }
            }
        }

        info!("Persistence writer stopped");
    }
}
