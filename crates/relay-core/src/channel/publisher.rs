//! One-shot publisher used by subsequent instances.
//!
//! Looks up the subscriber through the channel's endpoint record, names the
//! channel in a hello the listener must accept, sends one framed message, and
//! waits for the ack. The whole
//! exchange is bounded by a deadline so a hung first instance cannot keep an
//! exiting process alive.

use super::endpoint;
use super::protocol::{read_frame, write_frame, Hello};
use crate::config::ChannelConfig;
use crate::{RelayError, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of a single delivery attempt.
enum Attempt {
    Delivered,
    /// The subscriber is not reachable yet (or any more); worth retrying.
    NotReady(String),
}

/// Publish `payload` on `channel`, retrying until `timeout` elapses.
pub(crate) async fn publish(
    endpoint_path: &Path,
    channel: &str,
    payload: &[u8],
    timeout: Duration,
) -> Result<()> {
    if payload.len() > ChannelConfig::MAX_MESSAGE_SIZE {
        return Err(RelayError::Validation {
            field: "payload".to_string(),
            message: format!(
                "Message size {} exceeds maximum {}",
                payload.len(),
                ChannelConfig::MAX_MESSAGE_SIZE
            ),
        });
    }

    let deadline = Instant::now() + timeout;

    loop {
        let attempt = tokio::time::timeout_at(
            deadline,
            try_deliver(endpoint_path, channel, payload),
        )
        .await
        .map_err(|_| RelayError::PublishTimeout {
            channel: channel.to_string(),
            timeout,
        })??;

        match attempt {
            Attempt::Delivered => {
                debug!("Published {} bytes on {}", payload.len(), channel);
                return Ok(());
            }
            Attempt::NotReady(reason) => {
                if Instant::now() + ChannelConfig::PUBLISH_RETRY_INTERVAL >= deadline {
                    return Err(RelayError::ChannelUnavailable {
                        channel: channel.to_string(),
                        message: reason,
                    });
                }
                debug!("Channel {} not ready ({}), retrying", channel, reason);
                tokio::time::sleep(ChannelConfig::PUBLISH_RETRY_INTERVAL).await;
            }
        }
    }
}

async fn try_deliver(endpoint_path: &Path, channel: &str, payload: &[u8]) -> Result<Attempt> {
    let record = match endpoint::read_record(endpoint_path) {
        Ok(Some(record)) => record,
        Ok(None) => return Ok(Attempt::NotReady("no endpoint record".to_string())),
        Err(e) => return Ok(Attempt::NotReady(e.to_string())),
    };

    if record.channel != channel {
        return Ok(Attempt::NotReady(format!(
            "endpoint record belongs to channel {}",
            record.channel
        )));
    }

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, record.port));
    let mut stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(e) => {
            return Ok(Attempt::NotReady(format!(
                "connect to {} (PID {}) failed: {}",
                addr, record.pid, e
            )))
        }
    };
    let (mut reader, mut writer) = stream.split();

    // Name the channel first. The subscriber acks with an empty frame and drops
    // peers that name anything else, which also catches a stale record whose
    // port now belongs to another program.
    let hello = serde_json::to_vec(&Hello::new(channel))?;
    let accepted = match write_frame(&mut writer, &hello).await {
        Ok(()) => matches!(read_frame(&mut reader).await, Ok(Some(ack)) if ack.is_empty()),
        Err(_) => false,
    };
    if !accepted {
        return Ok(Attempt::NotReady(format!(
            "listener at {} did not accept channel {}",
            addr, channel
        )));
    }

    // From here on a failure may mean the message was already received, so it
    // is reported instead of retried.
    let unavailable = |e: RelayError| RelayError::ChannelUnavailable {
        channel: channel.to_string(),
        message: e.to_string(),
    };

    write_frame(&mut writer, payload).await.map_err(unavailable)?;
    match read_frame(&mut reader).await.map_err(unavailable)? {
        Some(_) => {}
        None => {
            return Err(RelayError::ChannelUnavailable {
                channel: channel.to_string(),
                message: "subscriber closed the connection before acknowledging".to_string(),
            })
        }
    }

    let _ = writer.shutdown().await;
    Ok(Attempt::Delivered)
}
