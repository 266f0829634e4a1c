use std::time::Duration;

use messaging_client::{MessagingClient, MessagingError};

use crate::{broker_addr, load_test_config};

#[test]
fn test_fixture_config_loads() {
    let config = load_test_config();
    assert_eq!(config.routing.queue, "orders");
    assert_eq!(config.routing.consumer_name, "worker-1");
    assert_eq!(config.connect_timeout(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_empty_connection_string_aborts_before_dialing() {
    let mut client = MessagingClient::new();
    let err = client.connect_to_broker("").await.unwrap_err();

    assert!(matches!(err, MessagingError::InvalidConfig(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_publish_before_connect_aborts_before_io() {
    let client = MessagingClient::new();
    let err = client
        .publish_on_queue(br#"{"id":1}"#, "orders")
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::NotConnected(_)));
    assert!(err.to_string().contains("not initialized"));
}

#[tokio::test]
#[ignore] // Requires a running broker
async fn test_connection_establishes_and_closes() {
    let mut client = MessagingClient::new().with_connect_timeout(Duration::from_secs(5));
    client.connect_to_broker(&broker_addr()).await.unwrap();
    assert!(client.is_connected());

    client.close().await.unwrap();
    assert!(!client.is_connected());

    // Closing twice is harmless.
    client.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running broker
async fn test_reconnect_replaces_connection() {
    let mut client = MessagingClient::new();
    client.connect_to_broker(&broker_addr()).await.unwrap();
    client.connect_to_broker(&broker_addr()).await.unwrap();
    assert!(client.is_connected());
    client.close().await.unwrap();
}
