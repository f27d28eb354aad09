/// Live feed tests
mod common;

use common::FakeTransport;
use futures_util::StreamExt;
use notify_core::credential::StaticCredential;
use notify_core::feed::LiveFeed;
use notify_core::push::ConnectionState;
use notify_core::Config;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn feed(transport: &FakeTransport) -> LiveFeed {
    LiveFeed::new(
        Config::default(),
        Arc::new(transport.clone()),
        Arc::new(StaticCredential::token("tok")),
    )
}

#[tokio::test(start_paused = true)]
async fn test_length_matches_decoded_frames() {
    let transport = FakeTransport::new();
    let mut feed = feed(&transport);
    let mut stream = feed.subscribe(Some("42")).await;
    transport.wait_connects(1).await;

    let frames = [
        r#"{"id": 1}"#,
        "not json at all",
        r#"{"id": 2, "type": "chat"}"#,
        "{broken",
        r#"[1, 2, 3]"#,
        r#"{"type": "AUTH_ACK"}"#,
        r#""just a string""#,
    ];
    for frame in frames {
        transport.push(0, frame);
    }

    // id 1, id 2, the array, the ack and the string decode
    let mut received = Vec::new();
    for _ in 0..5 {
        received.push(stream.next().await.unwrap());
    }
    assert_eq!(received[0].payload, json!({"id": 1}));
    assert_eq!(received[2].payload, json!([1, 2, 3]));
    assert_eq!(received[3].payload, json!({"type": "AUTH_ACK"}));

    let stats = feed.close().await.unwrap();
    assert_eq!(feed.len().await, 5);
    assert_eq!(stats.frames_delivered, 5);
    assert_eq!(stats.frames_dropped, 2);
    assert_eq!(stats.auth_acks, 1);

    // Closing keeps the accumulated items and ends the stream
    assert!(stream.next().await.is_none());
    assert_eq!(feed.items().await.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_ack_between_payloads_is_stored() {
    let transport = FakeTransport::new();
    let mut feed = feed(&transport);
    let mut stream = feed.subscribe(Some("42")).await;
    transport.wait_connects(1).await;

    transport.push(0, r#"{"id": 1}"#);
    transport.push(0, r#"{"type": "AUTH_OK"}"#);
    transport.push(0, r#"{"id": 2}"#);
    for _ in 0..3 {
        stream.next().await.unwrap();
    }

    let items = feed.items().await;
    assert_eq!(items.len(), 3);
    assert_eq!(items[1].payload, json!({"type": "AUTH_OK"}));
    feed.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_tears_down_first() {
    let transport = FakeTransport::new();
    let mut feed = feed(&transport);

    let mut first = feed.subscribe(Some("alice")).await;
    transport.wait_connects(1).await;
    transport.push(0, r#"{"id": "a-1"}"#);
    assert_eq!(first.next().await.unwrap().payload["id"], json!("a-1"));

    let mut second = feed.subscribe(Some("bob")).await;
    assert!(transport.client_closed(0));
    assert!(first.next().await.is_none());
    assert_eq!(feed.user_id(), Some("bob"));

    // New identity starts from an empty sequence
    assert!(feed.is_empty().await);

    transport.wait_connects(2).await;
    assert_eq!(transport.url(1), "ws://127.0.0.1:8000/ws/bob");
    transport.push(1, r#"{"id": "b-1"}"#);
    assert_eq!(second.next().await.unwrap().payload["id"], json!("b-1"));
    assert_eq!(feed.len().await, 1);

    // Old connection never comes back
    sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.connects(), 2);

    feed.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_same_identity_keeps_sequence() {
    let transport = FakeTransport::new();
    let mut feed = feed(&transport);

    let mut stream = feed.subscribe(Some("alice")).await;
    transport.wait_connects(1).await;
    transport.push(0, r#"{"id": 1}"#);
    stream.next().await.unwrap();

    let _stream = feed.subscribe(Some("alice")).await;
    assert_eq!(feed.len().await, 1);

    feed.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_every_subscriber_sees_payloads() {
    let transport = FakeTransport::new();
    let mut feed = feed(&transport);
    let mut a = feed.subscribe(Some("42")).await;
    let mut b = feed.stream();
    transport.wait_connects(1).await;

    transport.push(0, r#"{"id": 9}"#);
    assert_eq!(a.next().await.unwrap().payload["id"], json!(9));
    assert_eq!(b.next().await.unwrap().payload["id"], json!(9));

    feed.close().await;
}

#[tokio::test]
async fn test_no_identity_no_connection() {
    let transport = FakeTransport::new();
    let mut feed = feed(&transport);
    let mut stream = feed.subscribe(None).await;

    assert_eq!(feed.connection_state(), None);
    assert_eq!(transport.connects(), 0);
    assert!(feed.close().await.is_none());

    // Nothing can ever arrive
    drop(feed);
    assert!(stream.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_connection_state_visible() {
    let transport = FakeTransport::new();
    let mut feed = feed(&transport);
    let _stream = feed.subscribe(Some("42")).await;
    transport.wait_connects(1).await;
    sleep(Duration::from_millis(10)).await;

    assert_eq!(feed.connection_state(), Some(ConnectionState::Open));
    feed.close().await;
    assert_eq!(feed.connection_state(), None);
}
