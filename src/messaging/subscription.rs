// src/messaging/subscription.rs
use futures_lite::StreamExt;
use lapin::{Channel, Consumer};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::DeliveryHandler;

/// A registered consumer's delivery task.
#[derive(Debug)]
pub(crate) struct Subscription {
    id: Uuid,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(id: Uuid, handle: JoinHandle<()>) -> Self {
        Self { id, handle }
    }

    /// Hands `consumer` and the channel it was registered on to a new task
    /// that calls `handler` once per delivery, in delivery order.
    pub(crate) fn spawn(
        channel: Channel,
        consumer: Consumer,
        consumer_name: &str,
        queue_name: &str,
        handler: DeliveryHandler,
    ) -> Self {
        let id = Uuid::new_v4();
        let handle = tokio::spawn(consume_loop(
            id,
            channel,
            consumer,
            consumer_name.to_string(),
            queue_name.to_string(),
            handler,
        ));

        info!(
            subscription_id = %id,
            consumer = %consumer_name,
            queue = %queue_name,
            "Started consuming"
        );

        Self::new(id, handle)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn stop(self) {
        if !self.handle.is_finished() {
            debug!(subscription_id = %self.id, "Stopping consumer task");
            self.handle.abort();
        }
    }
}

async fn consume_loop(
    id: Uuid,
    channel: Channel,
    mut consumer: Consumer,
    consumer_name: String,
    queue_name: String,
    handler: DeliveryHandler,
) {
    let mut delivered: u64 = 0;

    while let Some(delivery_result) = consumer.next().await {
        match delivery_result {
            Ok(delivery) => {
                delivered += 1;
                debug!(
                    subscription_id = %id,
                    delivery_tag = delivery.delivery_tag,
                    bytes = delivery.data.len(),
                    "Delivering message to handler"
                );
                handler(delivery);
            }
            Err(e) => {
                error!(
                    subscription_id = %id,
                    consumer = %consumer_name,
                    "Error receiving message: {}",
                    e
                );
                break;
            }
        }
    }

    if channel.status().connected() {
        if let Err(e) = channel.close(200, "Consumer finished").await {
            warn!(subscription_id = %id, "Failed to close consumer channel: {}", e);
        }
    }

    info!(
        subscription_id = %id,
        consumer = %consumer_name,
        queue = %queue_name,
        delivered,
        "Consumer stopped"
    );
}
