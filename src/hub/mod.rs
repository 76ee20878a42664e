//! Connection hub
//!
//! Tracks live real-time connections, their channel subscriptions, and
//! fans out auth events. The registry and channel index mutate together
//! under one lock, so subscribe/unsubscribe/broadcast are linearizable.
//! Outbound delivery never holds that lock: every connection drains its
//! own bounded queue through a single writer task.

pub mod event;
pub mod liveness;
pub mod message;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};

pub use event::{AuthEvent, AuthEventKind};
pub use liveness::ActivityTracker;
pub use message::{ClientMessage, ServerMessage};

/// Outbound queue depth per connection. A connection that falls this far
/// behind starts losing broadcasts rather than stalling everyone else.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// A live connection as seen from the hub side
pub struct ConnectionHandle {
    /// Fresh id for this connection, never reused
    pub client_id: String,

    /// Hands outbound frames to the connection's writer task
    pub sender: mpsc::Sender<ServerMessage>,

    /// Drained by the connection's writer task
    pub receiver: mpsc::Receiver<ServerMessage>,
}

/// Identity left behind by a closed connection
#[derive(Debug, Clone)]
pub struct ClosedConnection {
    pub user_id: String,
    pub device_id: Option<String>,
}

/// Snapshot of a connection's state (diagnostics and tests)
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub client_id: String,
    pub user_id: String,
    pub device_id: Option<String>,
    pub subscriptions: HashSet<String>,
    pub connected_at: DateTime<Utc>,
}

struct ConnectionEntry {
    user_id: String,
    device_id: Option<String>,
    subscriptions: HashSet<String>,
    connected_at: DateTime<Utc>,
    sender: mpsc::Sender<ServerMessage>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<String, ConnectionEntry>,
    channels: HashMap<String, HashSet<String>>,
}

/// Registry of live connections and their channel subscriptions
#[derive(Default)]
pub struct ConnectionHub {
    state: RwLock<HubState>,
}

impl ConnectionHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and hand back its outbound queue
    pub async fn connect(&self, user_id: &str, device_id: Option<&str>) -> ConnectionHandle {
        let client_id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

        let entry = ConnectionEntry {
            user_id: user_id.to_string(),
            device_id: device_id.map(ToString::to_string),
            subscriptions: HashSet::new(),
            connected_at: Utc::now(),
            sender: sender.clone(),
        };

        self.state
            .write()
            .await
            .connections
            .insert(client_id.clone(), entry);

        tracing::info!(client_id = %client_id, user_id, device_id = ?device_id, "connection opened");
        ConnectionHandle {
            client_id,
            sender,
            receiver,
        }
    }

    /// Subscribe a connection to channels.
    ///
    /// The requested list is intersected with the connection's authorized
    /// namespace (`user:<own user>`, `device:<own device>`); unauthorized
    /// entries are silently dropped. Returns the granted subset, which is
    /// exactly what the acknowledgment echoes.
    pub async fn subscribe(&self, client_id: &str, requested: &[String]) -> Vec<String> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(entry) = state.connections.get_mut(client_id) else {
            return Vec::new();
        };

        let mut granted = Vec::new();
        for channel in requested {
            if !channel_authorized(channel, &entry.user_id, entry.device_id.as_deref()) {
                tracing::debug!(client_id, %channel, "dropped unauthorized subscription");
                continue;
            }
            entry.subscriptions.insert(channel.clone());
            state
                .channels
                .entry(channel.clone())
                .or_default()
                .insert(client_id.to_string());
            granted.push(channel.clone());
        }

        granted
    }

    /// Remove channels from a connection's subscription set. Returns the
    /// channels actually removed, matching subscribe's echo contract.
    pub async fn unsubscribe(&self, client_id: &str, channels: &[String]) -> Vec<String> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(entry) = state.connections.get_mut(client_id) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        for channel in channels {
            if entry.subscriptions.remove(channel) {
                detach_subscriber(&mut state.channels, channel, client_id);
                removed.push(channel.clone());
            }
        }

        removed
    }

    /// Fan an event out to every connection subscribed to a channel.
    ///
    /// The subscriber set is computed under the lock; delivery happens
    /// after it is released. A connection with a full queue loses the
    /// frame instead of blocking the hub. Returns the delivery count.
    pub async fn broadcast(&self, channel: &str, event: &AuthEvent) -> usize {
        let targets: Vec<(String, mpsc::Sender<ServerMessage>)> = {
            let state = self.state.read().await;
            state
                .channels
                .get(channel)
                .map(|subscribers| {
                    subscribers
                        .iter()
                        .filter_map(|id| {
                            state
                                .connections
                                .get(id)
                                .map(|entry| (id.clone(), entry.sender.clone()))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for (client_id, sender) in targets {
            let msg = ServerMessage::AuthEvent {
                event: event.clone(),
            };
            match sender.try_send(msg) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(client_id = %client_id, channel, "outbound queue full, dropping broadcast");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        tracing::debug!(channel, kind = %event.kind, delivered, "broadcast");
        delivered
    }

    /// Broadcast an event to its user's channel
    pub async fn broadcast_to_user(&self, event: &AuthEvent) -> usize {
        self.broadcast(&user_channel(&event.user_id), event).await
    }

    /// Close a connection: remove it from the registry and every channel
    /// set. Runs before any cleanup broadcast, so a connection can never
    /// observe its own removal event.
    pub async fn disconnect(&self, client_id: &str) -> Option<ClosedConnection> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let entry = state.connections.remove(client_id)?;

        for channel in &entry.subscriptions {
            detach_subscriber(&mut state.channels, channel, client_id);
        }

        tracing::info!(client_id, user_id = %entry.user_id, "connection closed");
        Some(ClosedConnection {
            user_id: entry.user_id,
            device_id: entry.device_id,
        })
    }

    /// Snapshot a connection's state
    pub async fn connection(&self, client_id: &str) -> Option<ConnectionInfo> {
        let state = self.state.read().await;
        state.connections.get(client_id).map(|entry| ConnectionInfo {
            client_id: client_id.to_string(),
            user_id: entry.user_id.clone(),
            device_id: entry.device_id.clone(),
            subscriptions: entry.subscriptions.clone(),
            connected_at: entry.connected_at,
        })
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}

/// Channel name for a user's broadcast scope
#[must_use]
pub fn user_channel(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Channel name for a device's broadcast scope
#[must_use]
pub fn device_channel(device_id: &str) -> String {
    format!("device:{device_id}")
}

/// A connection may only hold subscriptions in its own namespace
fn channel_authorized(channel: &str, user_id: &str, device_id: Option<&str>) -> bool {
    if let Some(id) = channel.strip_prefix("user:") {
        return id == user_id;
    }
    if let Some(id) = channel.strip_prefix("device:") {
        return device_id == Some(id);
    }
    false
}

fn detach_subscriber(
    channels: &mut HashMap<String, HashSet<String>>,
    channel: &str,
    client_id: &str,
) {
    if let Some(subscribers) = channels.get_mut(channel) {
        subscribers.remove(client_id);
        if subscribers.is_empty() {
            channels.remove(channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(receiver: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = receiver.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_channel_authorization() {
        assert!(channel_authorized("user:u1", "u1", None));
        assert!(!channel_authorized("user:u2", "u1", None));
        assert!(channel_authorized("device:d1", "u1", Some("d1")));
        assert!(!channel_authorized("device:d1", "u1", Some("d2")));
        assert!(!channel_authorized("device:d1", "u1", None));
        // Un-namespaced and foreign-namespaced channels never authorize
        assert!(!channel_authorized("u1", "u1", None));
        assert!(!channel_authorized("broadcast:all", "u1", Some("d1")));
    }

    #[tokio::test]
    async fn test_subscribe_filters_unauthorized() {
        let hub = ConnectionHub::new();
        let conn = hub.connect("u1", Some("d1")).await;

        let granted = hub
            .subscribe(
                &conn.client_id,
                &[
                    "user:u1".to_string(),
                    "user:u2".to_string(),
                    "device:d1".to_string(),
                    "device:d9".to_string(),
                ],
            )
            .await;

        assert_eq!(granted, vec!["user:u1".to_string(), "device:d1".to_string()]);

        let info = hub.connection(&conn.client_id).await.unwrap();
        assert_eq!(info.subscriptions.len(), 2);
        assert!(!info.subscriptions.contains("user:u2"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers_including_sender() {
        let hub = ConnectionHub::new();
        let mut a = hub.connect("u1", Some("d1")).await;
        let mut b = hub.connect("u1", Some("d2")).await;
        let mut other = hub.connect("u2", None).await;

        hub.subscribe(&a.client_id, &["user:u1".to_string()]).await;
        hub.subscribe(&b.client_id, &["user:u1".to_string()]).await;
        hub.subscribe(&other.client_id, &["user:u2".to_string()]).await;

        let event = AuthEvent::device_added("d1", "u1", "Phone");
        let delivered = hub.broadcast_to_user(&event).await;
        assert_eq!(delivered, 2);

        assert_eq!(drain(&mut a.receiver).len(), 1);
        assert_eq!(drain(&mut b.receiver).len(), 1);
        assert!(drain(&mut other.receiver).is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let hub = ConnectionHub::new();
        let mut conn = hub.connect("u1", None).await;

        hub.subscribe(&conn.client_id, &["user:u1".to_string()]).await;
        let removed = hub
            .unsubscribe(&conn.client_id, &["user:u1".to_string(), "user:u9".to_string()])
            .await;
        assert_eq!(removed, vec!["user:u1".to_string()]);

        hub.broadcast_to_user(&AuthEvent::device_added("d1", "u1", "Phone"))
            .await;
        assert!(drain(&mut conn.receiver).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_removes_from_channel_sets() {
        let hub = ConnectionHub::new();
        let mut a = hub.connect("u1", Some("d1")).await;
        let mut b = hub.connect("u1", Some("d2")).await;

        hub.subscribe(&a.client_id, &["user:u1".to_string()]).await;
        hub.subscribe(&b.client_id, &["user:u1".to_string()]).await;

        let closed = hub.disconnect(&a.client_id).await.unwrap();
        assert_eq!(closed.user_id, "u1");
        assert_eq!(closed.device_id.as_deref(), Some("d1"));

        // The removal broadcast goes out after the disconnect, so the
        // closed connection can never see its own device_removed event
        let event = AuthEvent::device_removed("d1", "u1", "disconnected");
        let delivered = hub.broadcast_to_user(&event).await;
        assert_eq!(delivered, 1);
        assert!(drain(&mut a.receiver).is_empty());
        assert_eq!(drain(&mut b.receiver).len(), 1);

        // Double disconnect is a no-op
        assert!(hub.disconnect(&a.client_id).await.is_none());
    }

    #[tokio::test]
    async fn test_client_ids_are_fresh() {
        let hub = ConnectionHub::new();
        let a = hub.connect("u1", None).await;
        let b = hub.connect("u1", None).await;
        assert_ne!(a.client_id, b.client_id);
        assert_eq!(hub.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let hub = ConnectionHub::new();
        let conn = hub.connect("u1", None).await;
        hub.subscribe(&conn.client_id, &["user:u1".to_string()]).await;

        let event = AuthEvent::device_added("d1", "u1", "Phone");
        for _ in 0..OUTBOUND_QUEUE_DEPTH {
            assert_eq!(hub.broadcast_to_user(&event).await, 1);
        }
        // Queue full: broadcast completes without delivery, no deadlock
        assert_eq!(hub.broadcast_to_user(&event).await, 0);
    }
}
