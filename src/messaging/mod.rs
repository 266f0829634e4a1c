// src/messaging/mod.rs
// AMQP messaging client: connection lifecycle, publishing and subscriptions

pub mod client;
pub mod connection;
pub mod error;
pub mod types;

mod channel;
mod subscription;

// Re-export specific items to simplify imports elsewhere
pub use client::{MessagingClient, MessagingClientTrait, DEFAULT_CONNECT_TIMEOUT};
pub use error::{MessagingError, Result};
pub use types::{DeliveryHandler, ExchangeType, JSON_CONTENT_TYPE};
