//! # Notification Hub
//!
//! Many-to-many mapping between client connections and jobs, plus fan-out
//! of job events to the connections subscribed at publish time.
//!
//! Three indexes are kept: `connections` (the source of truth),
//! `job_subscribers` and `user_connections`. Whenever an operation holds a
//! `connections` entry while touching another index it takes the
//! `connections` guard first; no operation holds a secondary index guard
//! while locking `connections`. Empty secondary entries are dropped with
//! `remove_if` after every guard on them is released.
//!
//! Delivery is best-effort and at-most-once: an event published before a
//! subscription exists, or to a connection whose channel is gone, is lost.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{EventType, NotificationEvent};
use super::transport::{RealtimeTransport, TransportError};
use crate::config::NotificationsConfig;
use crate::error::{OrchestrationError, OrchestrationResult};

/// A client connection known to the hub
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    pub connection_id: String,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub subscribed_jobs: HashSet<Uuid>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct HubStats {
    pub connections: usize,
    /// Jobs with at least one subscriber
    pub subscribed_jobs: usize,
    /// Connection/job pairs
    pub subscriptions: usize,
    pub users: usize,
}

/// Outcome of one fan-out
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: Vec<String>,
}

pub struct NotificationHub {
    connections: DashMap<String, Connection>,
    job_subscribers: DashMap<Uuid, HashSet<String>>,
    user_connections: DashMap<String, HashSet<String>>,
    transport: Arc<dyn RealtimeTransport>,
    config: NotificationsConfig,
}

impl NotificationHub {
    pub fn new(transport: Arc<dyn RealtimeTransport>, config: NotificationsConfig) -> Self {
        Self {
            connections: DashMap::new(),
            job_subscribers: DashMap::new(),
            user_connections: DashMap::new(),
            transport,
            config,
        }
    }

    pub fn config(&self) -> &NotificationsConfig {
        &self.config
    }

    /// Register a connection. Registering a known id refreshes its identity
    /// and activity but keeps its subscriptions.
    pub fn register_connection(
        &self,
        connection_id: impl Into<String>,
        user_id: Option<String>,
        project_id: Option<String>,
    ) {
        let connection_id = connection_id.into();
        let now = Utc::now();

        match self.connections.entry(connection_id.clone()) {
            Entry::Occupied(mut entry) => {
                let connection = entry.get_mut();
                if connection.user_id != user_id {
                    if let Some(previous) = connection.user_id.take() {
                        self.remove_from_user_index(&previous, &connection_id);
                    }
                    if let Some(user) = &user_id {
                        self.user_connections
                            .entry(user.clone())
                            .or_default()
                            .insert(connection_id.clone());
                    }
                }
                connection.user_id = user_id;
                connection.project_id = project_id;
                connection.last_activity = now;
            }
            Entry::Vacant(entry) => {
                if let Some(user) = &user_id {
                    self.user_connections
                        .entry(user.clone())
                        .or_default()
                        .insert(connection_id.clone());
                }
                entry.insert(Connection {
                    connection_id: connection_id.clone(),
                    user_id,
                    project_id,
                    subscribed_jobs: HashSet::new(),
                    connected_at: now,
                    last_activity: now,
                });
            }
        }

        debug!(connection_id = %connection_id, "Connection registered");
    }

    /// Drop a connection from every index
    pub async fn unregister_connection(&self, connection_id: &str) -> Option<Connection> {
        // Removing from `connections` first stops concurrent subscribes from
        // adding new index entries for this connection.
        let (_, connection) = self.connections.remove(connection_id)?;

        for job_id in &connection.subscribed_jobs {
            if let Some(mut subscribers) = self.job_subscribers.get_mut(job_id) {
                subscribers.remove(connection_id);
            }
            self.job_subscribers
                .remove_if(job_id, |_, subscribers| subscribers.is_empty());
        }

        if let Some(user) = &connection.user_id {
            self.remove_from_user_index(user, connection_id);
        }

        self.transport.disconnect(connection_id).await;

        debug!(
            connection_id = connection_id,
            subscriptions = connection.subscribed_jobs.len(),
            "Connection unregistered"
        );
        Some(connection)
    }

    pub fn subscribe(&self, connection_id: &str, job_id: Uuid) -> OrchestrationResult<()> {
        let mut connection = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| OrchestrationError::connection_not_found(connection_id))?;

        connection.subscribed_jobs.insert(job_id);
        connection.last_activity = Utc::now();
        self.job_subscribers
            .entry(job_id)
            .or_default()
            .insert(connection_id.to_string());
        Ok(())
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, connection_id: &str, job_id: Uuid) -> OrchestrationResult<bool> {
        let existed = {
            let mut connection = self
                .connections
                .get_mut(connection_id)
                .ok_or_else(|| OrchestrationError::connection_not_found(connection_id))?;

            connection.last_activity = Utc::now();
            let existed = connection.subscribed_jobs.remove(&job_id);
            if let Some(mut subscribers) = self.job_subscribers.get_mut(&job_id) {
                subscribers.remove(connection_id);
            }
            existed
        };

        self.job_subscribers
            .remove_if(&job_id, |_, subscribers| subscribers.is_empty());
        Ok(existed)
    }

    /// Record client activity
    pub fn touch(&self, connection_id: &str) -> OrchestrationResult<()> {
        let mut connection = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| OrchestrationError::connection_not_found(connection_id))?;
        connection.last_activity = Utc::now();
        Ok(())
    }

    /// Deliver an event to the connections subscribed to `job_id` right now
    pub async fn publish(
        &self,
        job_id: Uuid,
        event_type: EventType,
        payload: Value,
    ) -> PublishReport {
        let recipients = self.subscribers(job_id);
        let event = NotificationEvent::for_job(job_id, event_type, payload);
        self.deliver(&recipients, &event).await
    }

    /// Deliver an event to every connection of a user
    pub async fn publish_to_user(&self, user_id: &str, event: NotificationEvent) -> PublishReport {
        let recipients: Vec<String> = self
            .user_connections
            .get(user_id)
            .map(|connections| connections.iter().cloned().collect())
            .unwrap_or_default();
        self.deliver(&recipients, &event).await
    }

    /// Snapshot of the connections subscribed to a job, sorted
    pub fn subscribers(&self, job_id: Uuid) -> Vec<String> {
        let mut subscribers: Vec<String> = self
            .job_subscribers
            .get(&job_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        subscribers.sort();
        subscribers
    }

    pub fn connection(&self, connection_id: &str) -> Option<Connection> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    pub fn user_connection_ids(&self, user_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .user_connections
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            subscribed_jobs: self.job_subscribers.len(),
            subscriptions: self
                .job_subscribers
                .iter()
                .map(|entry| entry.value().len())
                .sum(),
            users: self.user_connections.len(),
        }
    }

    /// Unregister connections idle for longer than the configured timeout
    pub async fn reap_idle(&self) -> Vec<String> {
        self.reap_idle_older_than(self.config.idle_timeout()).await
    }

    pub async fn reap_idle_older_than(&self, idle: Duration) -> Vec<String> {
        let Ok(idle) = chrono::Duration::from_std(idle) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - idle;

        let stale: Vec<String> = self
            .connections
            .iter()
            .filter(|entry| entry.value().last_activity < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = Vec::with_capacity(stale.len());
        for connection_id in stale {
            // Re-check: the client may have been active since the scan
            let still_idle = self
                .connections
                .get(&connection_id)
                .is_some_and(|connection| connection.last_activity < cutoff);
            if still_idle && self.unregister_connection(&connection_id).await.is_some() {
                reaped.push(connection_id);
            }
        }

        if !reaped.is_empty() {
            info!(reaped = reaped.len(), "🧹 Reaped idle connections");
        }
        reaped
    }

    async fn deliver(&self, recipients: &[String], event: &NotificationEvent) -> PublishReport {
        let send_timeout = self.config.send_timeout();

        let outcomes = join_all(recipients.iter().map(|connection_id| async move {
            let outcome = match timeout(send_timeout, self.transport.send(connection_id, event))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(connection_id.clone())),
            };
            (connection_id, outcome)
        }))
        .await;

        let mut report = PublishReport {
            attempted: recipients.len(),
            ..Default::default()
        };
        for (connection_id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(
                        connection_id = %connection_id,
                        event_type = %event.event_type,
                        error = %error,
                        "Event delivery failed"
                    );
                    report.failed.push(connection_id.clone());
                }
            }
        }

        debug!(
            event_type = %event.event_type,
            job_id = ?event.job_id,
            delivered = report.delivered,
            failed = report.failed.len(),
            "Event published"
        );
        report
    }

    fn remove_from_user_index(&self, user_id: &str, connection_id: &str) {
        if let Some(mut connections) = self.user_connections.get_mut(user_id) {
            connections.remove(connection_id);
        }
        self.user_connections
            .remove_if(user_id, |_, connections| connections.is_empty());
    }
}
