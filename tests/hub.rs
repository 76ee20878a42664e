//! Realtime fan-out integration tests
//!
//! Exercises the connection hub and proximity engine together the way the
//! WebSocket layer drives them: two devices of one user subscribed to the
//! user channel, observing each other's auth events.

use tether_gateway::hub::{AuthEvent, ConnectionHub, ServerMessage};
use tether_gateway::proximity::ProximityEngine;

mod common;
use common::test_state;

fn auth_events(messages: Vec<ServerMessage>) -> Vec<AuthEvent> {
    messages
        .into_iter()
        .filter_map(|msg| match msg {
            ServerMessage::AuthEvent { event } => Some(event),
            _ => None,
        })
        .collect()
}

fn drain(
    receiver: &mut tokio::sync::mpsc::Receiver<ServerMessage>,
) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = receiver.try_recv() {
        out.push(msg);
    }
    out
}

#[tokio::test]
async fn test_proximity_update_fans_out_to_user_channel() {
    let hub = ConnectionHub::new();
    let engine = ProximityEngine::new();

    let mut d1 = hub.connect("user-1", Some("d1")).await;
    let mut d2 = hub.connect("user-1", Some("d2")).await;
    hub.subscribe(&d1.client_id, &["user:user-1".to_string()]).await;
    hub.subscribe(&d2.client_id, &["user:user-1".to_string()]).await;

    let status = engine.update("d1", "user-1", -30, None).await.unwrap();
    hub.broadcast_to_user(&AuthEvent::proximity_changed("d1", "user-1", -30, &status))
        .await;

    // Both connections observe the event, the sender included
    for receiver in [&mut d1.receiver, &mut d2.receiver] {
        let events = auth_events(drain(receiver));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].device_id, "d1");
        assert_eq!(events[0].data["locked"], false);
        assert_eq!(events[0].data["proximity"], "immediate");
    }
}

#[tokio::test]
async fn test_forced_close_notifies_others_never_self() {
    let hub = ConnectionHub::new();

    let mut d1 = hub.connect("user-1", Some("d1")).await;
    let mut d2 = hub.connect("user-1", Some("d2")).await;
    hub.subscribe(&d1.client_id, &["user:user-1".to_string()]).await;
    hub.subscribe(&d2.client_id, &["user:user-1".to_string()]).await;

    // Force-close d1 the way the liveness monitor does: disconnect first,
    // then broadcast
    let closed = hub.disconnect(&d1.client_id).await.unwrap();
    let device_id = closed.device_id.unwrap();
    hub.broadcast_to_user(&AuthEvent::device_removed(
        &device_id,
        &closed.user_id,
        "disconnected",
    ))
    .await;

    let d2_events = auth_events(drain(&mut d2.receiver));
    assert_eq!(d2_events.len(), 1);
    assert_eq!(d2_events[0].device_id, "d1");
    assert_eq!(d2_events[0].data["reason"], "disconnected");

    // The closed connection never observes its own removal
    assert!(auth_events(drain(&mut d1.receiver)).is_empty());
}

#[tokio::test]
async fn test_subscription_scope_is_per_user() {
    let hub = ConnectionHub::new();

    let mut alice = hub.connect("alice", Some("a1")).await;
    let mut eve = hub.connect("eve", Some("e1")).await;

    // Eve tries to follow Alice's channel; the hub silently drops it
    let granted = hub
        .subscribe(
            &eve.client_id,
            &["user:alice".to_string(), "user:eve".to_string()],
        )
        .await;
    assert_eq!(granted, vec!["user:eve".to_string()]);

    hub.subscribe(&alice.client_id, &["user:alice".to_string()]).await;
    hub.broadcast_to_user(&AuthEvent::device_added("a1", "alice", "Phone"))
        .await;

    assert_eq!(auth_events(drain(&mut alice.receiver)).len(), 1);
    assert!(auth_events(drain(&mut eve.receiver)).is_empty());
}

#[tokio::test]
async fn test_device_channel_subscription() {
    let hub = ConnectionHub::new();

    let mut watch = hub.connect("user-1", Some("watch")).await;
    let granted = hub
        .subscribe(&watch.client_id, &["device:watch".to_string()]).await;
    assert_eq!(granted, vec!["device:watch".to_string()]);

    hub.broadcast(
        "device:watch",
        &AuthEvent::device_added("watch", "user-1", "Watch"),
    )
    .await;
    assert_eq!(auth_events(drain(&mut watch.receiver)).len(), 1);
}

#[tokio::test]
async fn test_broadcast_uses_set_at_broadcast_time() {
    let hub = ConnectionHub::new();

    let mut d1 = hub.connect("user-1", Some("d1")).await;
    hub.subscribe(&d1.client_id, &["user:user-1".to_string()]).await;

    hub.broadcast_to_user(&AuthEvent::device_added("d2", "user-1", "Laptop"))
        .await;
    hub.unsubscribe(&d1.client_id, &["user:user-1".to_string()]).await;
    hub.broadcast_to_user(&AuthEvent::device_added("d3", "user-1", "Tablet"))
        .await;

    // Only the event from before the unsubscribe arrives
    let events = auth_events(drain(&mut d1.receiver));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_id, "d2");
}

#[tokio::test]
async fn test_many_concurrent_connections() {
    let state = test_state();
    let hub = &state.hub;

    let mut connections = Vec::new();
    for i in 0..32 {
        let conn = hub.connect("user-1", Some(&format!("d{i}"))).await;
        hub.subscribe(&conn.client_id, &["user:user-1".to_string()]).await;
        connections.push(conn);
    }
    assert_eq!(hub.connection_count().await, 32);

    let delivered = hub
        .broadcast_to_user(&AuthEvent::device_added("d0", "user-1", "Phone"))
        .await;
    assert_eq!(delivered, 32);

    for conn in &mut connections {
        assert_eq!(auth_events(drain(&mut conn.receiver)).len(), 1);
    }
}
