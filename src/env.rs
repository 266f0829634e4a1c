// src/env.rs
use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dotenv::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub amqp_addr: String,
    pub queue: String,
    pub consumer_name: String,
    pub connect_timeout_seconds: u64,
}

fn default_queue() -> String {
    "orders".to_string()
}

fn default_consumer_name() -> String {
    "worker-1".to_string()
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

impl Config {
    /// Reads the process environment, after loading a `.env` file if present.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let amqp_addr = lookup("AMQP_ADDR")
            .filter(|addr| !addr.trim().is_empty())
            .ok_or_else(|| anyhow!("AMQP_ADDR must be set to the broker connection string"))?;

        Ok(Config {
            amqp_addr,
            queue: lookup("MESSAGING_QUEUE").unwrap_or_else(default_queue),
            consumer_name: lookup("MESSAGING_CONSUMER").unwrap_or_else(default_consumer_name),
            connect_timeout_seconds: match lookup("MESSAGING_CONNECT_TIMEOUT_SECONDS") {
                Some(val) => val
                    .parse()
                    .context("MESSAGING_CONNECT_TIMEOUT_SECONDS must be a whole number")?,
                None => default_connect_timeout_seconds(),
            },
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}
