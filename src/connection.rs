/// Connection registry for live client sessions
///
/// Tracks active connections, their owning coordinator instance, and
/// per-connection delivery constraints. The transport is abstract: each
/// connection owns the sending half of an unbounded channel and the host's
/// transport binding drains the receiving half.
use crate::error::SyncError;
use crate::hooks::HookChain;
use crate::message::OutboundEvent;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Unique identifier for a client connection
pub type ConnectionId = Uuid;

/// Transport-level session attributes
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Unique connection id
    pub id: ConnectionId,

    /// Owning coordinator instance
    pub coordinator_id: String,

    /// Optional client-scoping token
    pub scope_token: Option<String>,
}

/// A live connection: attributes plus the outbound channel half
struct ConnectionHandle {
    info: ConnectionInfo,
    tx: UnboundedSender<OutboundEvent>,
}

/// Registry of live connections for one coordinator instance
pub struct ConnectionRegistry {
    /// Map: connection_id -> handle
    connections: DashMap<ConnectionId, ConnectionHandle>,

    /// Messages delivered since creation
    messages_sent: Arc<RwLock<usize>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            messages_sent: Arc::new(RwLock::new(0)),
        }
    }

    /// Register a new connection, returning its attributes and the
    /// receiving half of its outbound channel
    pub fn register(
        &self,
        coordinator_id: &str,
        scope_token: Option<String>,
    ) -> (ConnectionInfo, UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let info = ConnectionInfo {
            id: Uuid::new_v4(),
            coordinator_id: coordinator_id.to_string(),
            scope_token,
        };

        tracing::info!(
            "Registered connection {} for coordinator {}",
            info.id,
            coordinator_id
        );

        self.connections.insert(
            info.id,
            ConnectionHandle {
                info: info.clone(),
                tx,
            },
        );

        (info, rx)
    }

    /// Remove a connection, dropping its outbound channel
    ///
    /// Scheduled broadcasts are unaffected; they iterate live connections
    /// at fire time.
    pub fn unregister(&self, conn_id: ConnectionId) {
        if let Some((_, handle)) = self.connections.remove(&conn_id) {
            tracing::info!(
                "Unregistered connection {} for coordinator {}",
                conn_id,
                handle.info.coordinator_id
            );
        }
    }

    /// Attributes of a live connection
    pub fn get(&self, conn_id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(&conn_id).map(|h| h.info.clone())
    }

    /// Whether a message may be delivered to a connection
    ///
    /// Deliverable unless the event targets a different connection id, or
    /// any registered connection-validity hook objects. No target and no
    /// objection defaults to deliver-to-all.
    pub async fn is_eligible(
        &self,
        conn: &ConnectionInfo,
        event: &OutboundEvent,
        hooks: &HookChain,
    ) -> bool {
        if let Some(target) = event.target {
            if target != conn.id {
                return false;
            }
        }
        hooks.connection_valid(conn, &event.payload).await
    }

    /// Deliver an event to every eligible live connection
    ///
    /// Connections whose receiving half is gone are unregistered lazily;
    /// the fan-out itself never fails. Returns the delivered count.
    pub async fn broadcast(
        &self,
        event: OutboundEvent,
        origin_widget: Option<&str>,
        hooks: &HookChain,
    ) -> usize {
        let handles: Vec<(ConnectionInfo, UnboundedSender<OutboundEvent>)> = self
            .connections
            .iter()
            .map(|entry| (entry.info.clone(), entry.tx.clone()))
            .collect();

        let mut sent_count = 0;
        let mut dead = Vec::new();

        for (info, tx) in handles {
            if !self.is_eligible(&info, &event, hooks).await {
                continue;
            }
            if tx.send(event.clone()).is_err() {
                dead.push(info.id);
                continue;
            }
            sent_count += 1;
        }

        for conn_id in dead {
            tracing::warn!("Dropping dead connection {}", conn_id);
            self.unregister(conn_id);
        }

        *self.messages_sent.write() += sent_count;

        tracing::debug!(
            "Broadcast {} to {} connections (origin: {:?})",
            event.event,
            sent_count,
            origin_widget
        );

        sent_count
    }

    /// Deliver an event to exactly one connection
    pub fn send_to(&self, conn_id: ConnectionId, event: OutboundEvent) -> Result<(), SyncError> {
        let handle = self
            .connections
            .get(&conn_id)
            .ok_or(SyncError::TransportClosed(conn_id))?;

        handle
            .tx
            .send(event)
            .map_err(|_| SyncError::TransportClosed(conn_id))?;

        *self.messages_sent.write() += 1;
        Ok(())
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Total messages delivered
    pub fn messages_sent(&self) -> usize {
        *self.messages_sent.read()
    }

    /// Drop every connection (coordinator teardown)
    pub fn clear(&self) {
        self.connections.clear();
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
