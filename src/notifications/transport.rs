//! Realtime delivery seam. The hub is transport-agnostic; `ChannelTransport`
//! hands events to per-connection tokio channels, which a push endpoint
//! (websocket, SSE) drains.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use super::events::NotificationEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("No delivery channel attached for connection {0}")]
    UnknownConnection(String),

    #[error("Delivery channel for connection {0} is closed")]
    Closed(String),

    #[error("Delivery to connection {0} timed out")]
    Timeout(String),
}

/// Push channel to connected clients
#[async_trait]
pub trait RealtimeTransport: Send + Sync + 'static {
    async fn send(&self, connection_id: &str, event: &NotificationEvent)
        -> Result<(), TransportError>;

    /// Release transport resources for a connection the hub dropped
    async fn disconnect(&self, _connection_id: &str) {}
}

/// Bounded mpsc channel per connection
#[derive(Debug)]
pub struct ChannelTransport {
    channels: DashMap<String, mpsc::Sender<NotificationEvent>>,
    capacity: usize,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open (or replace) the delivery channel of a connection
    pub fn attach(&self, connection_id: impl Into<String>) -> mpsc::Receiver<NotificationEvent> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.channels.insert(connection_id.into(), sender);
        receiver
    }

    pub fn detach(&self, connection_id: &str) -> bool {
        self.channels.remove(connection_id).is_some()
    }

    pub fn attached(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl RealtimeTransport for ChannelTransport {
    async fn send(
        &self,
        connection_id: &str,
        event: &NotificationEvent,
    ) -> Result<(), TransportError> {
        // Clone the sender so no map guard is held across the await
        let sender = self
            .channels
            .get(connection_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::UnknownConnection(connection_id.to_string()))?;

        sender.send(event.clone()).await.map_err(|_| {
            debug!(connection_id = connection_id, "Receiver dropped, detaching channel");
            self.channels.remove(connection_id);
            TransportError::Closed(connection_id.to_string())
        })
    }

    async fn disconnect(&self, connection_id: &str) {
        self.detach(connection_id);
    }
}
