// packages/backend/src/hub.rs
//! Live-connection registry and the single dispatch loop that fans events out.
//!
//! Producers only ever call [`BroadcastHub::publish`]. Events go through one
//! bounded FIFO queue; a dedicated task drains it and pushes each encoded
//! frame to every connection registered at that moment. A failed push drops
//! that connection and delivery carries on with the rest.

use crate::error::TransportError;
use crate::types::Event;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Outbound half of a live client connection (WebSocket or test double).
pub trait PushChannel: Send + Sync + 'static {
    /// Sends one encoded text frame.
    fn push(&self, frame: Arc<str>) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Best-effort close; errors are swallowed.
    fn close(&self) -> BoxFuture<'_, ()>;
}

type Registry = Arc<DashMap<ConnectionId, Arc<dyn PushChannel>>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub events_dispatched: u64,
    pub frames_pushed: u64,
    pub connections_dropped: u64,
    pub live_connections: usize,
}

#[derive(Default)]
struct AtomicHubStats {
    events_dispatched: AtomicU64,
    frames_pushed: AtomicU64,
    connections_dropped: AtomicU64,
}

pub struct BroadcastHub {
    connections: Registry,
    queue: mpsc::Sender<Event>,
    stats: Arc<AtomicHubStats>,
}

impl BroadcastHub {
    /// Creates the hub and spawns its dispatch loop. Must run inside a tokio runtime.
    /// The loop ends once the hub is dropped and the queue has drained.
    pub fn start(capacity: usize) -> Self {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let connections: Registry = Arc::new(DashMap::new());
        let stats = Arc::new(AtomicHubStats::default());

        tokio::spawn(dispatch_loop(connections.clone(), rx, stats.clone()));
        info!("📡 [HUB] Dispatch loop started (queue capacity {})", capacity);

        Self {
            connections,
            queue,
            stats,
        }
    }

    /// Registers a connection and announces the new live count.
    pub async fn join(&self, conn: Arc<dyn PushChannel>) -> (ConnectionId, usize) {
        let id = Uuid::new_v4();
        self.connections.insert(id, conn);
        let count = self.connections.len();
        debug!("[HUB] Connection {} joined ({} live)", id, count);
        self.publish(Event::UserCount(count)).await;
        (id, count)
    }

    /// Unregisters a connection (no-op if the dispatcher already dropped it)
    /// and announces the new live count.
    pub async fn leave(&self, id: &ConnectionId) -> usize {
        self.connections.remove(id);
        let count = self.connections.len();
        debug!("[HUB] Connection {} left ({} live)", id, count);
        self.publish(Event::UserCount(count)).await;
        count
    }

    /// Queues an event for every connected client. Waits while the queue is full.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.queue.send(event).await {
            // Only possible if the dispatch task died
            error!("❌ [HUB] Dispatch loop gone, event {} lost", e.0.kind());
        }
    }

    pub fn live_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Forgets every registration without closing the channels.
    pub fn clear(&self) {
        self.connections.clear();
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            events_dispatched: self.stats.events_dispatched.load(Ordering::Relaxed),
            frames_pushed: self.stats.frames_pushed.load(Ordering::Relaxed),
            connections_dropped: self.stats.connections_dropped.load(Ordering::Relaxed),
            live_connections: self.connections.len(),
        }
    }
}

async fn dispatch_loop(
    connections: Registry,
    mut rx: mpsc::Receiver<Event>,
    stats: Arc<AtomicHubStats>,
) {
    while let Some(event) = rx.recv().await {
        let frame: Arc<str> = match event.encode() {
            Ok(json) => json.into(),
            Err(e) => {
                error!("❌ [HUB] Failed to encode {} event: {}", event.kind(), e);
                continue;
            }
        };
        stats.events_dispatched.fetch_add(1, Ordering::Relaxed);

        // Snapshot first: no shard lock may be held across an await
        let targets: Vec<(ConnectionId, Arc<dyn PushChannel>)> = connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (id, conn) in targets {
            match conn.push(frame.clone()).await {
                Ok(()) => {
                    stats.frames_pushed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("⚠️ [HUB] Push to {} failed: {}. Dropping connection.", id, e);
                    if connections.remove(&id).is_some() {
                        stats.connections_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    conn.close().await;
                }
            }
        }
    }
    info!("📡 [HUB] Dispatch loop stopped");
}
