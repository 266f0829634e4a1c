// src/messaging/channel.rs
use lapin::types::FieldTable;
use lapin::{Channel, Connection};
use tracing::{debug, warn};

use super::error::{MessagingError, Result};
use super::types::{exchange_declare_options, queue_declare_options, ExchangeType};

/// Opens a new channel on `connection`.
pub(crate) async fn open_channel(connection: &Connection) -> Result<Channel> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| MessagingError::Channel(format!("Failed to create channel: {}", e)))?;

    debug!(channel_id = channel.id(), "Opened channel");
    Ok(channel)
}

/// Releases a channel. Takes it by value so a channel can only be released once.
///
/// Release failures are logged and swallowed: the operation that used the
/// channel has already produced its result.
pub(crate) async fn release_channel(channel: Channel) {
    let channel_id = channel.id();

    if !channel.status().connected() {
        debug!(channel_id, "Channel already closed by broker");
        return;
    }

    match channel.close(200, "Operation complete").await {
        Ok(()) => debug!(channel_id, "Released channel"),
        Err(e) => warn!(channel_id, "Failed to release channel: {}", e),
    }
}

/// Declares `queue_name` with the fixed queue properties and returns the name
/// the broker settled on (server generated when `queue_name` is empty).
pub(crate) async fn declare_queue(channel: &Channel, queue_name: &str) -> Result<String> {
    let queue = channel
        .queue_declare(queue_name, queue_declare_options(), FieldTable::default())
        .await
        .map_err(|e| {
            MessagingError::Declare(format!("Failed to declare queue '{}': {}", queue_name, e))
        })?;

    let declared = queue.name().as_str().to_string();
    debug!(queue = %declared, messages = queue.message_count(), "Queue declared");
    Ok(declared)
}

pub(crate) async fn declare_exchange(
    channel: &Channel,
    exchange_name: &str,
    exchange_type: ExchangeType,
) -> Result<()> {
    channel
        .exchange_declare(
            exchange_name,
            exchange_type.into(),
            exchange_declare_options(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            MessagingError::Declare(format!(
                "Failed to declare {} exchange '{}': {}",
                exchange_type, exchange_name, e
            ))
        })?;

    debug!(exchange = %exchange_name, kind = %exchange_type, "Exchange declared");
    Ok(())
}

/// Declares the exchange plus a server named queue bound to it, keyed by the
/// exchange name. Returns the bound queue's name.
pub(crate) async fn declare_bound_queue(
    channel: &Channel,
    exchange_name: &str,
    exchange_type: ExchangeType,
) -> Result<String> {
    declare_exchange(channel, exchange_name, exchange_type).await?;
    let queue_name = declare_queue(channel, "").await?;

    channel
        .queue_bind(
            &queue_name,
            exchange_name,
            exchange_name,
            lapin::options::QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            MessagingError::Bind(format!(
                "Failed to bind queue '{}' to exchange '{}': {}",
                queue_name, exchange_name, e
            ))
        })?;

    debug!(queue = %queue_name, exchange = %exchange_name, "Queue bound");
    Ok(queue_name)
}
