//! # Router Flows
//!
//! An event router whose directory points a named channel at the relay's
//! produce endpoint: routed events land in the channel's backlog and reach
//! the consumer like any other message.

use std::sync::Arc;
use std::time::Duration;

use super::harness::{start, test_config, Tailer};
use channel_relay::ChannelId;
use event_router::{
    Endpoint, EventRouter, HttpForwarder, RouteOutcome, RoutedEvent, ServiceEntry, StaticDirectory,
    DEFAULT_LABEL_KEY,
};
use relay_tail::RelayClient;

#[tokio::test]
async fn test_routed_event_reaches_consumer() {
    let node = start(test_config()).await;
    let client = RelayClient::new(&node.base_url).unwrap();
    let created = client.create_channel(Some("deploy")).await.unwrap();

    let port: u16 = node.base_url.rsplit(':').next().unwrap().parse().unwrap();
    let directory = StaticDirectory::new();
    directory.register(
        ServiceEntry::new(
            "relay",
            Endpoint::new("127.0.0.1", port, "/channels/deploy/messages"),
        )
        .with_label(DEFAULT_LABEL_KEY, "deploy"),
    );
    let router = EventRouter::new(
        Arc::new(directory),
        Arc::new(HttpForwarder::new(Duration::from_secs(5)).unwrap()),
    );

    let outcome = router
        .route(RoutedEvent::new(
            "Deploy.Started",
            serde_json::json!({ "build": 7 }),
        ))
        .await
        .unwrap();
    assert!(matches!(outcome, RouteOutcome::Dispatched { ref channel, .. } if channel == "deploy"));

    let unresolved = router
        .route(RoutedEvent::new("Audit.Entry", serde_json::Value::Null))
        .await
        .unwrap();
    assert_eq!(
        unresolved,
        RouteOutcome::Unresolved {
            channel: "audit".into()
        }
    );

    let channel = ChannelId::parse("deploy").unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while node.relay.backlog_len(&channel) != Some(1) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let mut consumer = Tailer::spawn(&node.base_url, &created.token);
    let message: serde_json::Value = serde_json::from_str(&consumer.next().await).unwrap();
    assert_eq!(message["build"], 7);
}
