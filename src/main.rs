// src/main.rs
use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use messaging_client::config;
use messaging_client::env::Config;
use messaging_client::message::OrderMessage;
use messaging_client::MessagingClient;

struct Settings {
    amqp_addr: String,
    queue: String,
    consumer_name: String,
    connect_timeout: std::time::Duration,
}

fn load_settings() -> Result<Settings> {
    match config::load_config() {
        Ok(file) => Ok(Settings {
            connect_timeout: file.connect_timeout(),
            amqp_addr: file.connection.uri,
            queue: file.routing.queue,
            consumer_name: file.routing.consumer_name,
        }),
        Err(e) => {
            info!("No config file used ({}), reading the environment", e);
            let env = Config::load().context("Failed to load configuration")?;
            Ok(Settings {
                connect_timeout: env.connect_timeout(),
                amqp_addr: env.amqp_addr,
                queue: env.queue,
                consumer_name: env.consumer_name,
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings()?;

    let mut client = MessagingClient::new().with_connect_timeout(settings.connect_timeout);

    // No broker means nothing to do: fail startup.
    client
        .connect_to_broker(&settings.amqp_addr)
        .await
        .context("Cannot start without a broker connection")?;

    client
        .subscribe_to_queue(&settings.queue, &settings.consumer_name, |delivery| {
            match OrderMessage::from_bytes(&delivery.data) {
                Ok(order) => info!(order_id = order.id, "Received order"),
                Err(e) => warn!("Received a non-order payload: {}", e),
            }
        })
        .await?;

    if let Err(e) = client
        .publish_json_on_queue(&OrderMessage::new(1), &settings.queue)
        .await
    {
        error!("Failed to publish order: {}", e);
    }

    info!("Service running. Press Ctrl+C to exit.");
    tokio::signal::ctrl_c().await?;

    client.close().await?;
    Ok(())
}
