// src/message.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order event exchanged on the `orders` queue by the demo binary.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct OrderMessage {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placed_at: Option<DateTime<Utc>>,
}

impl OrderMessage {
    pub fn new(id: u64) -> Self {
        OrderMessage { id, placed_at: None }
    }

    /// Stamps the message with the current time.
    pub fn placed_now(mut self) -> Self {
        self.placed_at = Some(Utc::now());
        self
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
