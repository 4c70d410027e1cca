//! # Consumer Flows
//!
//! A producer and a consumer that never coordinate:
//!
//! 1. Messages produced before the consumer attaches are replayed in order
//! 2. Messages produced while it is attached are delivered live
//! 3. Once it leaves, the channel is gone and messages are dropped
//! 4. A second consumer with the same token takes over the channel
//! 5. Bad or unusable tokens never reach the backlog
//! 6. Stopping the node closes attached consumers cleanly

use super::harness::{start, test_config, wait_for, Tailer};
use channel_relay::ChannelId;
use relay_tail::{RelayClient, TailEnd, TailError};

#[tokio::test]
async fn test_backlog_replayed_then_live_then_closed() {
    let node = start(test_config()).await;
    let client = RelayClient::new(&node.base_url).unwrap();

    let created = client.create_channel(Some("build-1001")).await.unwrap();
    assert_eq!(created.channel_id, "build-1001");
    assert!(created.live_tail);

    for line in ["step 1", "step 2", "step 3"] {
        let result = client.produce(&created.channel_id, line).await.unwrap();
        assert_eq!(result.outcome, "buffered");
    }

    let mut consumer = Tailer::spawn(&node.base_url, &created.token);
    assert_eq!(consumer.next().await, "step 1");
    assert_eq!(consumer.next().await, "step 2");
    assert_eq!(consumer.next().await, "step 3");

    wait_for(&node.relay, |s| s.live_connections == 1).await;
    let result = client.produce(&created.channel_id, "step 4").await.unwrap();
    assert_eq!(result.outcome, "delivered");
    assert_eq!(consumer.next().await, "step 4");

    // Dropping the socket without a close frame still detaches the consumer
    consumer.handle.abort();
    wait_for(&node.relay, |s| s.live_connections == 0).await;

    let result = client.produce(&created.channel_id, "step 5").await.unwrap();
    assert_eq!(result.outcome, "dropped");
    assert_eq!(result.reason.as_deref(), Some("unknown_channel"));

    let stats = node.relay.stats();
    assert_eq!(stats.messages_replayed, 3);
    assert_eq!(stats.messages_delivered_live, 1);
    assert_eq!(stats.disconnects, 1);
    assert_eq!(stats.buffering_channels, 0);
}

#[tokio::test]
async fn test_produce_to_unknown_channel_is_accepted_and_dropped() {
    let node = start(test_config()).await;
    let client = RelayClient::new(&node.base_url).unwrap();

    let result = client
        .produce(ChannelId::generate().as_str(), "nobody listens")
        .await
        .unwrap();
    assert_eq!(result.outcome, "dropped");
    assert_eq!(result.reason.as_deref(), Some("unknown_channel"));
    assert_eq!(node.relay.stats().dropped.unknown_channel, 1);
}

#[tokio::test]
async fn test_second_consumer_supersedes_first() {
    let node = start(test_config()).await;
    let client = RelayClient::new(&node.base_url).unwrap();
    let created = client.create_channel(None).await.unwrap();
    client.produce(&created.channel_id, "backlog").await.unwrap();

    let mut first = Tailer::spawn(&node.base_url, &created.token);
    assert_eq!(first.next().await, "backlog");
    wait_for(&node.relay, |s| s.attaches_accepted == 1).await;

    let mut second = Tailer::spawn(&node.base_url, &created.token);
    assert_eq!(first.end().await.unwrap(), TailEnd::Superseded);
    wait_for(&node.relay, |s| s.attaches_accepted == 2).await;

    let result = client.produce(&created.channel_id, "after takeover").await.unwrap();
    assert_eq!(result.outcome, "delivered");
    assert_eq!(second.next().await, "after takeover");

    let stats = node.relay.stats();
    assert_eq!(stats.attaches_superseded, 1);
    assert_eq!(stats.live_connections, 1);
}

#[tokio::test]
async fn test_tampered_token_rejected_before_upgrade() {
    let node = start(test_config()).await;
    let client = RelayClient::new(&node.base_url).unwrap();
    let created = client.create_channel(None).await.unwrap();
    client.produce(&created.channel_id, "secret backlog").await.unwrap();

    let (claims, signature) = created.token.split_once('.').unwrap();
    let flipped = if signature.starts_with('0') { "1" } else { "0" };
    let tampered = format!("{}.{}{}", claims, flipped, &signature[1..]);

    let err = Tailer::spawn(&node.base_url, &tampered).end().await.unwrap_err();
    assert!(matches!(err, TailError::Rejected { status: 401, .. }));

    // The backlog is untouched and still waiting for the real consumer
    assert_eq!(
        node.relay
            .backlog_len(&ChannelId::parse(&created.channel_id).unwrap()),
        Some(1)
    );
    assert_eq!(node.relay.stats().attaches_rejected, 1);
}

#[tokio::test]
async fn test_unavailable_token_is_service_unavailable() {
    let node = start(test_config()).await;

    let err = Tailer::spawn(&node.base_url, "unavailable")
        .end()
        .await
        .unwrap_err();
    assert!(matches!(err, TailError::Rejected { status: 503, .. }));
}

#[tokio::test]
async fn test_node_shutdown_closes_consumer_normally() {
    let mut node = start(test_config()).await;
    let client = RelayClient::new(&node.base_url).unwrap();
    let created = client.create_channel(Some("deploy-9")).await.unwrap();
    client.produce(&created.channel_id, "rolling out").await.unwrap();

    let mut consumer = Tailer::spawn(&node.base_url, &created.token);
    assert_eq!(consumer.next().await, "rolling out");
    wait_for(&node.relay, |s| s.live_connections == 1).await;

    node.shutdown().await;
    assert_eq!(consumer.end().await.unwrap(), TailEnd::Normal);

    let stats = node.relay.stats();
    assert_eq!(stats.live_connections, 0);
    assert_eq!(stats.disconnects, 1);
    assert_eq!(stats.dropped.delivery_failed, 0);
}
