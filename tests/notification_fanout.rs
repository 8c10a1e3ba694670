//! Notification hub fan-out across connections, users and the reaper loop.

mod common;

use common::drain;
use content_architect::config::NotificationsConfig;
use content_architect::notifications::{
    spawn_idle_reaper, ChannelTransport, EventType, NotificationEvent, NotificationHub,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

fn hub_with(config: NotificationsConfig) -> (Arc<NotificationHub>, Arc<ChannelTransport>) {
    let transport = Arc::new(ChannelTransport::new(16));
    let hub = Arc::new(NotificationHub::new(transport.clone(), config));
    (hub, transport)
}

#[tokio::test]
async fn test_events_reach_only_job_subscribers() {
    let (hub, transport) = hub_with(NotificationsConfig::default());
    let job_j = Uuid::new_v4();
    let job_k = Uuid::new_v4();

    let mut x = transport.attach("X");
    let mut y = transport.attach("Y");
    let mut z = transport.attach("Z");
    for id in ["X", "Y", "Z"] {
        hub.register_connection(id, None, None);
    }
    hub.subscribe("X", job_j).unwrap();
    hub.subscribe("Y", job_j).unwrap();
    hub.subscribe("Z", job_k).unwrap();

    let report = hub
        .publish(job_j, EventType::StepCompleted, json!({"step": "A", "percentage": 33}))
        .await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 2);
    assert!(report.failed.is_empty());

    for receiver in [&mut x, &mut y] {
        let events = drain(receiver);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::StepCompleted);
        assert_eq!(events[0].job_id, Some(job_j));
        assert_eq!(events[0].percentage(), Some(33));
    }
    assert!(drain(&mut z).is_empty());
}

#[tokio::test]
async fn test_late_subscriber_sees_only_new_events() {
    let (hub, transport) = hub_with(NotificationsConfig::default());
    let job = Uuid::new_v4();

    let report = hub
        .publish(job, EventType::StepCompleted, json!({"step": "A", "percentage": 33}))
        .await;
    assert_eq!(report.attempted, 0);

    let mut x = transport.attach("X");
    hub.register_connection("X", None, None);
    hub.subscribe("X", job).unwrap();
    assert!(drain(&mut x).is_empty());

    hub.publish(job, EventType::StepCompleted, json!({"step": "B", "percentage": 66}))
        .await;
    let events = drain(&mut x);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].percentage(), Some(66));
}

#[tokio::test]
async fn test_unregister_stops_delivery_and_cleans_indexes() {
    let (hub, transport) = hub_with(NotificationsConfig::default());
    let job = Uuid::new_v4();

    let _a = transport.attach("a");
    let mut b = transport.attach("b");
    hub.register_connection("a", Some("user-1".to_string()), None);
    hub.register_connection("b", Some("user-1".to_string()), None);
    hub.subscribe("a", job).unwrap();
    hub.subscribe("b", job).unwrap();

    let removed = hub.unregister_connection("a").await.unwrap();
    assert!(removed.subscribed_jobs.contains(&job));
    assert_eq!(hub.subscribers(job), vec!["b"]);
    assert_eq!(hub.user_connection_ids("user-1"), vec!["b"]);

    hub.unregister_connection("b").await;
    let stats = hub.stats();
    assert_eq!(stats.connections, 0);
    assert_eq!(stats.subscribed_jobs, 0);
    assert_eq!(stats.users, 0);

    let report = hub.publish(job, EventType::JobCompleted, json!({})).await;
    assert_eq!(report.attempted, 0);
    assert!(drain(&mut b).is_empty());
}

#[tokio::test]
async fn test_user_events_reach_every_user_connection() {
    let (hub, transport) = hub_with(NotificationsConfig::default());

    let mut laptop = transport.attach("laptop");
    let mut phone = transport.attach("phone");
    let mut other = transport.attach("other");
    hub.register_connection("laptop", Some("ana".to_string()), None);
    hub.register_connection("phone", Some("ana".to_string()), None);
    hub.register_connection("other", Some("ben".to_string()), None);

    let job_id = Uuid::new_v4();
    let report = hub
        .publish_to_user(
            "ana",
            NotificationEvent::for_job(job_id, EventType::JobQueued, json!({"percentage": 0})),
        )
        .await;
    assert_eq!(report.delivered, 2);

    assert_eq!(drain(&mut laptop).len(), 1);
    assert_eq!(drain(&mut phone).len(), 1);
    assert!(drain(&mut other).is_empty());
}

#[tokio::test]
async fn test_detached_channel_is_reported_without_blocking_others() {
    let (hub, transport) = hub_with(NotificationsConfig::default());
    let job = Uuid::new_v4();

    let mut live = transport.attach("live");
    hub.register_connection("live", None, None);
    hub.register_connection("gone", None, None);
    hub.subscribe("live", job).unwrap();
    hub.subscribe("gone", job).unwrap();

    let report = hub.publish(job, EventType::StepStarted, json!({})).await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, vec!["gone"]);
    assert_eq!(drain(&mut live).len(), 1);
}

#[tokio::test]
async fn test_reaper_loop_removes_idle_connections_until_shutdown() {
    let config = NotificationsConfig {
        idle_timeout_seconds: 0,
        ..NotificationsConfig::default()
    };
    let (hub, transport) = hub_with(config);
    let _receiver = transport.attach("sleepy");
    hub.register_connection("sleepy", Some("user".to_string()), None);
    hub.subscribe("sleepy", Uuid::new_v4()).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_idle_reaper(hub.clone(), Duration::from_millis(10), shutdown_rx);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while hub.stats().connections > 0 {
        assert!(tokio::time::Instant::now() < deadline, "reaper never ran");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(hub.stats(), Default::default());

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("reaper stops on shutdown")
        .unwrap();
}
