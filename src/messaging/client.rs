// src/messaging/client.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lapin::message::Delivery;
use lapin::types::FieldTable;
use lapin::{Channel, Connection};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::channel::{
    declare_bound_queue, declare_exchange, declare_queue, open_channel, release_channel,
};
use super::connection::{broker_address, close_connection, open_connection};
use super::error::{MessagingError, Result};
use super::subscription::Subscription;
use super::types::{consume_options, json_properties, publish_options, DeliveryHandler, ExchangeType};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect, publish and subscribe operations of a messaging client.
#[async_trait]
pub trait MessagingClientTrait: Send + Sync {
    /// Dial the broker named by `connection_string`.
    async fn connect_to_broker(&mut self, connection_string: &str) -> Result<()>;

    /// Publish `payload` through the named exchange, declaring it first.
    async fn publish(&self, payload: &[u8], exchange_name: &str, exchange_type: &str)
        -> Result<()>;

    /// Publish `payload` to `queue_name` through the default exchange.
    async fn publish_on_queue(&self, payload: &[u8], queue_name: &str) -> Result<()>;

    /// Consume from a queue bound to the named exchange.
    async fn subscribe(
        &self,
        exchange_name: &str,
        exchange_type: &str,
        consumer_name: &str,
        handler: DeliveryHandler,
    ) -> Result<()>;

    /// Consume from `queue_name`.
    async fn subscribe_to_queue(
        &self,
        queue_name: &str,
        consumer_name: &str,
        handler: DeliveryHandler,
    ) -> Result<()>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// Owns one broker connection. Every publish opens and releases its own
/// channel; every subscription keeps one channel for as long as it runs.
pub struct MessagingClient {
    connection: Option<Connection>,
    connect_timeout: Duration,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Default for MessagingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MessagingClient {
    pub fn new() -> Self {
        Self {
            connection: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map_or(false, |conn| conn.status().connected())
    }

    /// Number of consumers whose delivery task is still running.
    pub fn active_subscriptions(&self) -> Result<usize> {
        let guard = self
            .subscriptions
            .lock()
            .map_err(|_| MessagingError::LockPoisoned)?;
        Ok(guard.iter().filter(|s| !s.is_finished()).count())
    }

    pub async fn connect_to_broker(&mut self, connection_string: &str) -> Result<()> {
        let address = broker_address(connection_string)?;

        if let Some(previous) = self.connection.take() {
            warn!("Client already connected, replacing the existing connection");
            close_connection(previous).await?;
        }

        let connection = open_connection(&address, self.connect_timeout).await?;
        self.connection = Some(connection);
        Ok(())
    }

    fn connection(&self, operation: &str) -> Result<&Connection> {
        self.connection.as_ref().ok_or_else(|| {
            MessagingError::NotConnected(format!(
                "tried to {} before the broker connection was established",
                operation
            ))
        })
    }

    pub async fn publish_on_queue(&self, payload: &[u8], queue_name: &str) -> Result<()> {
        let connection = self.connection("publish on a queue")?;
        let channel = open_channel(connection).await?;

        let result = Self::declare_and_publish_on_queue(&channel, payload, queue_name).await;
        release_channel(channel).await;
        result?;

        info!(
            queue = %queue_name,
            bytes = payload.len(),
            "A message was sent to queue"
        );
        debug!(queue = %queue_name, payload = %String::from_utf8_lossy(payload), "Sent payload");
        Ok(())
    }

    async fn declare_and_publish_on_queue(
        channel: &Channel,
        payload: &[u8],
        queue_name: &str,
    ) -> Result<()> {
        let declared = declare_queue(channel, queue_name).await?;
        Self::send(channel, "", &declared, payload).await
    }

    pub async fn publish(
        &self,
        payload: &[u8],
        exchange_name: &str,
        exchange_type: ExchangeType,
    ) -> Result<()> {
        let connection = self.connection("publish to an exchange")?;
        let channel = open_channel(connection).await?;

        let result = Self::declare_and_publish(&channel, payload, exchange_name, exchange_type).await;
        release_channel(channel).await;
        result?;

        info!(
            exchange = %exchange_name,
            kind = %exchange_type,
            bytes = payload.len(),
            "A message was sent to exchange"
        );
        Ok(())
    }

    async fn declare_and_publish(
        channel: &Channel,
        payload: &[u8],
        exchange_name: &str,
        exchange_type: ExchangeType,
    ) -> Result<()> {
        declare_exchange(channel, exchange_name, exchange_type).await?;
        Self::send(channel, exchange_name, exchange_name, payload).await
    }

    async fn send(channel: &Channel, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
        channel
            .basic_publish(
                exchange,
                routing_key,
                publish_options(),
                payload,
                json_properties(),
            )
            .await
            .map_err(|e| MessagingError::Publish(e.to_string()))?
            .await
            .map_err(|e| MessagingError::Publish(e.to_string()))?;
        Ok(())
    }

    /// Serializes `message` as JSON and publishes it to `queue_name`.
    pub async fn publish_json_on_queue<T: Serialize + Sync>(
        &self,
        message: &T,
        queue_name: &str,
    ) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.publish_on_queue(&payload, queue_name).await
    }

    /// Serializes `message` as JSON and publishes it through the named exchange.
    pub async fn publish_json<T: Serialize + Sync>(
        &self,
        message: &T,
        exchange_name: &str,
        exchange_type: ExchangeType,
    ) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.publish(&payload, exchange_name, exchange_type).await
    }

    pub async fn subscribe<F>(
        &self,
        exchange_name: &str,
        exchange_type: ExchangeType,
        consumer_name: &str,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(Delivery) + Send + Sync + 'static,
    {
        let connection = self.connection("subscribe to an exchange")?;
        let channel = open_channel(connection).await?;

        let queue_name = match declare_bound_queue(&channel, exchange_name, exchange_type).await {
            Ok(queue_name) => queue_name,
            Err(e) => {
                release_channel(channel).await;
                return Err(e);
            }
        };

        self.start_consuming(
            channel,
            queue_name,
            consumer_name,
            Arc::new(handler),
        )
        .await
    }

    pub async fn subscribe_to_queue<F>(
        &self,
        queue_name: &str,
        consumer_name: &str,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(Delivery) + Send + Sync + 'static,
    {
        let connection = self.connection("subscribe to a queue")?;
        let channel = open_channel(connection).await?;

        let declared = match declare_queue(&channel, queue_name).await {
            Ok(declared) => declared,
            Err(e) => {
                release_channel(channel).await;
                return Err(e);
            }
        };

        self.start_consuming(
            channel,
            declared,
            consumer_name,
            Arc::new(handler),
        )
        .await
    }

    async fn start_consuming(
        &self,
        channel: Channel,
        queue_name: String,
        consumer_name: &str,
        handler: DeliveryHandler,
    ) -> Result<()> {
        let consumer = match channel
            .basic_consume(
                &queue_name,
                consumer_name,
                consume_options(),
                FieldTable::default(),
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                release_channel(channel).await;
                return Err(MessagingError::Consume(format!(
                    "Failed to register consumer '{}' on queue '{}': {}",
                    consumer_name, queue_name, e
                )));
            }
        };

        let subscription =
            Subscription::spawn(channel, consumer, consumer_name, &queue_name, handler);
        self.register(subscription)
    }

    // A subscription that cannot be tracked is stopped, so no task outlives
    // the error returned to the caller.
    fn register(&self, subscription: Subscription) -> Result<()> {
        match self.subscriptions.lock() {
            Ok(mut guard) => {
                guard.retain(|s| !s.is_finished());
                guard.push(subscription);
                Ok(())
            }
            Err(_) => {
                subscription.stop();
                Err(MessagingError::LockPoisoned)
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        let result = match self.connection.take() {
            Some(connection) => close_connection(connection).await,
            None => {
                debug!("Close called without an open connection");
                Ok(())
            }
        };

        let subscriptions = match self.subscriptions.get_mut() {
            Ok(subscriptions) => std::mem::take(subscriptions),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for subscription in subscriptions {
            subscription.stop();
        }

        result
    }
}

#[async_trait]
impl MessagingClientTrait for MessagingClient {
    async fn connect_to_broker(&mut self, connection_string: &str) -> Result<()> {
        MessagingClient::connect_to_broker(self, connection_string).await
    }

    async fn publish(
        &self,
        payload: &[u8],
        exchange_name: &str,
        exchange_type: &str,
    ) -> Result<()> {
        let exchange_type = exchange_type.parse::<ExchangeType>()?;
        MessagingClient::publish(self, payload, exchange_name, exchange_type).await
    }

    async fn publish_on_queue(&self, payload: &[u8], queue_name: &str) -> Result<()> {
        MessagingClient::publish_on_queue(self, payload, queue_name).await
    }

    async fn subscribe(
        &self,
        exchange_name: &str,
        exchange_type: &str,
        consumer_name: &str,
        handler: DeliveryHandler,
    ) -> Result<()> {
        let exchange_type = exchange_type.parse::<ExchangeType>()?;
        MessagingClient::subscribe(self, exchange_name, exchange_type, consumer_name, move |d| {
            handler(d)
        })
        .await
    }

    async fn subscribe_to_queue(
        &self,
        queue_name: &str,
        consumer_name: &str,
        handler: DeliveryHandler,
    ) -> Result<()> {
        MessagingClient::subscribe_to_queue(self, queue_name, consumer_name, move |d| handler(d))
            .await
    }

    async fn close(&mut self) -> Result<()> {
        MessagingClient::close(self).await
    }
}
