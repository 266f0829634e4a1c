use std::time::Duration;

use lapin::options::{QueueDeclareOptions, QueueDeleteOptions};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};
use messaging_client::message::OrderMessage;
use messaging_client::{ExchangeType, MessagingClient, MessagingError};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::{broker_addr, unique_queue};

const RECEIVE_WINDOW: Duration = Duration::from_secs(5);

async fn connected_client() -> MessagingClient {
    let mut client = MessagingClient::new().with_connect_timeout(Duration::from_secs(5));
    client
        .connect_to_broker(&broker_addr())
        .await
        .expect("broker must be reachable for ignored tests");
    client
}

#[tokio::test]
#[ignore] // Requires a running broker
async fn test_order_reaches_queue_consumer() {
    let client = connected_client().await;
    let queue = unique_queue("orders");
    let (tx, mut rx) = mpsc::unbounded_channel();

    client
        .subscribe_to_queue(&queue, "worker-1", move |delivery| {
            let _ = tx.send(delivery.data);
        })
        .await
        .unwrap();

    client.publish_on_queue(br#"{"id":1}"#, &queue).await.unwrap();

    let body = timeout(RECEIVE_WINDOW, rx.recv()).await.unwrap().unwrap();
    assert_eq!(body, br#"{"id":1}"#);

    // Exactly one delivery.
    assert!(timeout(Duration::from_millis(500), rx.recv()).await.is_err());

    let mut client = client;
    client.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running broker
async fn test_deliveries_keep_publish_order() {
    let client = connected_client().await;
    let queue = unique_queue("ordered");
    let (tx, mut rx) = mpsc::unbounded_channel();

    for id in 0..5 {
        client
            .publish_json_on_queue(&OrderMessage::new(id), &queue)
            .await
            .unwrap();
    }

    client
        .subscribe_to_queue(&queue, "worker-ordered", move |delivery| {
            let _ = tx.send(OrderMessage::from_bytes(&delivery.data).unwrap().id);
        })
        .await
        .unwrap();

    let mut received = Vec::new();
    while received.len() < 5 {
        received.push(timeout(RECEIVE_WINDOW, rx.recv()).await.unwrap().unwrap());
    }
    assert_eq!(received, vec![0, 1, 2, 3, 4]);

    let mut client = client;
    client.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running broker
async fn test_declaring_a_queue_twice_is_not_an_error() {
    let mut client = connected_client().await;
    let queue = unique_queue("idempotent");

    client.publish_on_queue(b"{}", &queue).await.unwrap();
    client.publish_on_queue(b"{}", &queue).await.unwrap();

    client.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running broker
async fn test_conflicting_queue_is_a_transient_error() {
    let queue = unique_queue("durable");

    // Another application already owns the queue, declared durable.
    let raw = Connection::connect(&broker_addr(), ConnectionProperties::default())
        .await
        .unwrap();
    let raw_channel = raw.create_channel().await.unwrap();
    raw_channel
        .queue_declare(
            &queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .unwrap();

    let mut client = connected_client().await;
    let err = client.publish_on_queue(b"{}", &queue).await.unwrap_err();
    assert!(matches!(err, MessagingError::Declare(_)));
    assert!(!err.is_fatal());

    // The failed channel was released and the connection is still usable.
    assert!(client.is_connected());
    client
        .publish_on_queue(b"{}", &unique_queue("after-failure"))
        .await
        .unwrap();

    client.close().await.unwrap();
    raw_channel
        .queue_delete(&queue, QueueDeleteOptions::default())
        .await
        .unwrap();
    raw.close(200, "Test completed").await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running broker
async fn test_fanout_exchange_round_trip() {
    let client = connected_client().await;
    let exchange = unique_queue("events");
    let (tx, mut rx) = mpsc::unbounded_channel();

    client
        .subscribe(&exchange, ExchangeType::Fanout, "audit", move |delivery| {
            let _ = tx.send(delivery.data);
        })
        .await
        .unwrap();
    assert_eq!(client.active_subscriptions().unwrap(), 1);

    client
        .publish(br#"{"event":"created"}"#, &exchange, ExchangeType::Fanout)
        .await
        .unwrap();

    let body = timeout(RECEIVE_WINDOW, rx.recv()).await.unwrap().unwrap();
    assert_eq!(body, br#"{"event":"created"}"#);

    let mut client = client;
    client.close().await.unwrap();
    assert_eq!(client.active_subscriptions().unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires a running broker
async fn test_close_stops_subscriptions() {
    let mut client = connected_client().await;
    let queue = unique_queue("closing");

    client
        .subscribe_to_queue(&queue, "worker-close", |_| {})
        .await
        .unwrap();
    assert_eq!(client.active_subscriptions().unwrap(), 1);

    client.close().await.unwrap();
    assert_eq!(client.active_subscriptions().unwrap(), 0);

    let err = client.publish_on_queue(b"{}", &queue).await.unwrap_err();
    assert!(err.is_fatal());
}
