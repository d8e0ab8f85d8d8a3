//! Registry of connected listeners
//!
//! Every listener owns a bounded channel. Broadcasting never waits on a
//! listener: a chunk that cannot be queued (listener gone or too far
//! behind) drops that listener and the rest of the fan-out carries on.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::error::SinkError;
use crate::events::{CloseReason, EngineEvent, EngineObserver, NoopObserver};

/// Opaque listener identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SinkId(Uuid);

impl SinkId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

struct SinkEntry {
    tx: mpsc::Sender<Bytes>,
    connected_at: DateTime<Utc>,
    bytes_sent: u64,
}

/// Snapshot of one registered listener
#[derive(Debug, Clone, Serialize)]
pub struct SinkInfo {
    pub id: SinkId,
    pub connected_at: DateTime<Utc>,
    pub bytes_sent: u64,
}

/// Shared set of listener sinks
#[derive(Clone)]
pub struct SinkRegistry {
    sinks: Arc<Mutex<HashMap<SinkId, SinkEntry>>>,
    capacity: usize,
    observer: Arc<dyn EngineObserver>,
}

impl SinkRegistry {
    /// Registry whose sinks each queue up to `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        Self::with_observer(capacity, Arc::new(NoopObserver))
    }

    pub fn with_observer(capacity: usize, observer: Arc<dyn EngineObserver>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
            observer,
        }
    }

    /// Add a listener. It receives chunks broadcast from now on.
    pub fn register(&self) -> (SinkId, ListenerStream) {
        let id = SinkId::new();
        let (tx, rx) = mpsc::channel(self.capacity);

        self.sinks.lock().insert(
            id,
            SinkEntry {
                tx,
                connected_at: Utc::now(),
                bytes_sent: 0,
            },
        );
        self.observer.on_event(&EngineEvent::SinkOpened { id });

        let stream = ListenerStream {
            id,
            rx,
            registry: self.clone(),
        };
        (id, stream)
    }

    /// Drop a listener. Chunks it already queued stay readable, then its
    /// stream ends. Returns whether the sink was registered.
    pub fn remove(&self, id: SinkId) -> bool {
        self.remove_with(id, CloseReason::Disconnected)
    }

    fn remove_with(&self, id: SinkId, reason: CloseReason) -> bool {
        let removed = self.sinks.lock().remove(&id).is_some();
        if removed {
            self.observer.on_event(&EngineEvent::SinkClosed { id, reason });
        }
        removed
    }

    /// Queue `chunk` on every registered sink. Returns how many sinks
    /// accepted it.
    pub fn broadcast(&self, chunk: &Bytes) -> usize {
        let mut failed = Vec::new();
        let delivered = {
            let mut sinks = self.sinks.lock();
            for (id, entry) in sinks.iter_mut() {
                match entry.tx.try_send(chunk.clone()) {
                    Ok(()) => entry.bytes_sent += chunk.len() as u64,
                    Err(TrySendError::Full(_)) => failed.push((*id, SinkError::Lagging)),
                    Err(TrySendError::Closed(_)) => failed.push((*id, SinkError::Closed)),
                }
            }
            for (id, _) in &failed {
                sinks.remove(id);
            }
            sinks.len()
        };

        for (id, error) in failed {
            self.observer.on_event(&EngineEvent::SinkClosed {
                id,
                reason: CloseReason::WriteFailed(error),
            });
        }
        delivered
    }

    /// End every stream and empty the registry
    pub fn end_all(&self) {
        let ended: Vec<SinkId> = self.sinks.lock().drain().map(|(id, _)| id).collect();
        tracing::debug!("Ending {} listener streams", ended.len());
        for id in ended {
            self.observer.on_event(&EngineEvent::SinkClosed {
                id,
                reason: CloseReason::StreamEnded,
            });
        }
    }

    pub fn contains(&self, id: SinkId) -> bool {
        self.sinks.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<SinkInfo> {
        self.sinks
            .lock()
            .iter()
            .map(|(id, entry)| SinkInfo {
                id: *id,
                connected_at: entry.connected_at,
                bytes_sent: entry.bytes_sent,
            })
            .collect()
    }
}

/// Receiving end of a listener sink.
///
/// Dropping it unregisters the sink, which is how a transport reports
/// that its client disconnected.
pub struct ListenerStream {
    id: SinkId,
    rx: mpsc::Receiver<Bytes>,
    registry: SinkRegistry,
}

impl ListenerStream {
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Next chunk, or `None` once the sink was removed and drained
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Refuse further chunks; already queued ones remain readable
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for ListenerStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ListenerStream {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
