//! # Node Flows
//!
//! Process-level wiring: the Prometheus observer behind `/metrics`, and the
//! backlog sweeper that runs alongside the server when a TTL is set.

use std::time::Duration;

use super::harness::{start, test_config, wait_for};
use relay_tail::RelayClient;

#[tokio::test]
async fn test_metrics_endpoint_reflects_traffic() {
    let node = start(test_config()).await;
    let client = RelayClient::new(&node.base_url).unwrap();

    let created = client.create_channel(None).await.unwrap();
    client.produce(&created.channel_id, "one").await.unwrap();
    client.produce("never-created", "two").await.unwrap();

    let text = reqwest::get(format!("{}/metrics", node.base_url))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(text.contains("relay_channels_created_total 1"));
    assert!(text.contains("relay_messages_buffered_total 1"));
    assert!(text.contains("relay_messages_dropped_total{reason=\"unknown_channel\"} 1"));
    assert_eq!(node.metrics.channels_created.get(), 1);
}

#[tokio::test]
async fn test_health_and_stats_endpoints() {
    let node = start(test_config()).await;

    let health: serde_json::Value = reqwest::get(format!("{}/health", node.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    RelayClient::new(&node.base_url)
        .unwrap()
        .create_channel(None)
        .await
        .unwrap();
    let stats: serde_json::Value = reqwest::get(format!("{}/stats", node.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["channels_created"], 1);
    assert_eq!(stats["buffering_channels"], 1);
}

/// `/stats` is per relay instance and `/metrics` is per process registry;
/// both are fed by the same relay events and must not drift apart.
#[tokio::test]
async fn test_stats_and_metrics_count_the_same_events() {
    let node = start(test_config()).await;
    let client = RelayClient::new(&node.base_url).unwrap();

    let created = client.create_channel(Some("ctx-agree")).await.unwrap();
    client.produce(&created.channel_id, "kept").await.unwrap();
    client.produce("never-created", "lost").await.unwrap();

    let stats = node.relay.stats();
    let metrics = &node.metrics;
    assert_eq!(stats.channels_created, metrics.channels_created.get());
    assert_eq!(stats.messages_buffered, metrics.messages_buffered.get());
    assert_eq!(
        stats.dropped.unknown_channel,
        metrics
            .messages_dropped
            .with_label_values(&["unknown_channel"])
            .get()
    );
    assert_eq!(stats.buffered_messages, 1);
}

#[tokio::test]
async fn test_sweeper_discards_unclaimed_backlog() {
    let mut config = test_config();
    config.buffer.ttl = Some(Duration::from_millis(200));
    config.buffer.sweep_interval = Duration::from_millis(50);
    let node = start(config).await;
    let client = RelayClient::new(&node.base_url).unwrap();

    let created = client.create_channel(None).await.unwrap();
    client.produce(&created.channel_id, "unclaimed").await.unwrap();
    assert_eq!(node.relay.stats().buffering_channels, 1);

    wait_for(&node.relay, |s| s.backlogs_expired == 1).await;

    let stats = node.relay.stats();
    assert_eq!(stats.buffering_channels, 0);
    assert_eq!(stats.messages_expired, 1);
    assert_eq!(node.metrics.backlogs_expired.get(), 1);

    let result = client.produce(&created.channel_id, "too late").await.unwrap();
    assert_eq!(result.outcome, "dropped");
}
