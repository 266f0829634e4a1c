// src/messaging/types.rs
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use lapin::message::Delivery;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueDeclareOptions,
};
use lapin::{BasicProperties, ExchangeKind};

use super::error::MessagingError;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Callback invoked once for every message delivered to a subscription.
pub type DeliveryHandler = Arc<dyn Fn(Delivery) + Send + Sync + 'static>;

/// Routing type of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeType {
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl ExchangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeType::Direct => "direct",
            ExchangeType::Fanout => "fanout",
            ExchangeType::Topic => "topic",
            ExchangeType::Headers => "headers",
        }
    }
}

impl fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeType {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(ExchangeType::Direct),
            "fanout" => Ok(ExchangeType::Fanout),
            "topic" => Ok(ExchangeType::Topic),
            "headers" => Ok(ExchangeType::Headers),
            other => Err(MessagingError::InvalidConfig(format!(
                "unsupported exchange type '{}'",
                other
            ))),
        }
    }
}

impl From<ExchangeType> for ExchangeKind {
    fn from(kind: ExchangeType) -> Self {
        match kind {
            ExchangeType::Direct => ExchangeKind::Direct,
            ExchangeType::Fanout => ExchangeKind::Fanout,
            ExchangeType::Topic => ExchangeKind::Topic,
            ExchangeType::Headers => ExchangeKind::Headers,
        }
    }
}

// Queues are non-durable, kept when unused, shared, and declared synchronously.
pub(crate) fn queue_declare_options() -> QueueDeclareOptions {
    QueueDeclareOptions {
        passive: false,
        durable: false,
        exclusive: false,
        auto_delete: false,
        nowait: false,
    }
}

pub(crate) fn exchange_declare_options() -> ExchangeDeclareOptions {
    ExchangeDeclareOptions {
        durable: true,
        ..ExchangeDeclareOptions::default()
    }
}

pub(crate) fn publish_options() -> BasicPublishOptions {
    BasicPublishOptions {
        mandatory: false,
        immediate: false,
    }
}

pub(crate) fn json_properties() -> BasicProperties {
    BasicProperties::default().with_content_type(JSON_CONTENT_TYPE.into())
}

// Deliveries are acknowledged by the broker on send.
pub(crate) fn consume_options() -> BasicConsumeOptions {
    BasicConsumeOptions {
        no_ack: true,
        ..BasicConsumeOptions::default()
    }
}
