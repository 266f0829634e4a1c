// src/messaging/connection.rs
use std::time::Duration;

use lapin::uri::AMQPUri;
use lapin::{Connection, ConnectionProperties};
use tokio::time::timeout;
use tracing::{error, info, warn};

use super::error::{MessagingError, Result};

/// Turns a caller supplied connection string into a dialable AMQP uri.
///
/// A path separator is inserted after the authority when the string names no
/// vhost, so `amqp://host:5672` dials the default vhost. Any query string is
/// kept after the separator. Strings that already carry a path are left as
/// they are.
pub fn broker_address(connection_string: &str) -> Result<String> {
    let trimmed = connection_string.trim();
    if trimmed.is_empty() {
        return Err(MessagingError::InvalidConfig(
            "Cannot initialize connection to broker, connection string not set".to_string(),
        ));
    }

    let authority_start = trimmed.find("://").map(|i| i + 3).ok_or_else(|| {
        MessagingError::InvalidConfig(format!("'{}' is missing a scheme", redact(trimmed)))
    })?;

    // The authority runs up to the path, query or fragment, whichever comes first.
    let authority_end = trimmed[authority_start..]
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .map(|i| authority_start + i)
        .unwrap_or(trimmed.len());

    if trimmed[authority_end..].starts_with('/') {
        return Ok(trimmed.to_string());
    }

    Ok(format!(
        "{}/{}",
        &trimmed[..authority_end],
        &trimmed[authority_end..]
    ))
}

pub(crate) fn parse_uri(address: &str) -> Result<AMQPUri> {
    address.parse::<AMQPUri>().map_err(|e| {
        MessagingError::InvalidConfig(format!("'{}' is not an AMQP uri: {}", redact(address), e))
    })
}

/// Replaces the password of a uri with `***` for logging.
pub fn redact(address: &str) -> String {
    let Some(scheme_end) = address.find("://") else {
        return address.to_string();
    };
    let authority_start = scheme_end + 3;
    let authority_end = address[authority_start..]
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .map(|i| authority_start + i)
        .unwrap_or(address.len());
    let authority = &address[authority_start..authority_end];

    match (authority.rfind('@'), authority.find(':')) {
        (Some(at), Some(colon)) if colon < at => format!(
            "{}{}:***{}",
            &address[..authority_start],
            &authority[..colon],
            &address[authority_start + at..]
        ),
        _ => address.to_string(),
    }
}

/// Dials the broker, bounded by `connect_timeout`.
pub(crate) async fn open_connection(address: &str, connect_timeout: Duration) -> Result<Connection> {
    let uri = parse_uri(address)?;
    let redacted = redact(address);

    info!(
        host = %uri.authority.host,
        port = uri.authority.port,
        vhost = %uri.vhost,
        "Connecting to AMQP broker"
    );

    match timeout(
        connect_timeout,
        Connection::connect_uri(uri, ConnectionProperties::default()),
    )
    .await
    {
        Ok(Ok(connection)) => {
            info!("Successfully connected to broker at {}", redacted);
            Ok(connection)
        }
        Ok(Err(e)) => {
            error!("Failed to connect to AMQP compatible broker at {}: {}", redacted, e);
            Err(MessagingError::Connection {
                address: redacted,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            error!(
                "Connection to {} timed out after {}ms",
                redacted,
                connect_timeout.as_millis()
            );
            Err(MessagingError::Timeout(format!(
                "no answer from {} after {}ms",
                redacted,
                connect_timeout.as_millis()
            )))
        }
    }
}

// Method for properly closing the connection when needed
pub(crate) async fn close_connection(connection: Connection) -> Result<()> {
    if !connection.status().connected() {
        warn!("Broker connection already closed");
        return Ok(());
    }

    info!("Closing broker connection gracefully");
    connection
        .close(200, "Closing messaging client")
        .await
        .map_err(|e| MessagingError::Connection {
            address: "current connection".to_string(),
            reason: e.to_string(),
        })
}
