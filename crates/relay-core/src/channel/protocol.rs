//! Channel wire protocol and framing.
//!
//! Every frame is a 4-byte big-endian length prefix followed by the payload.
//!
//! ```text
//! [u32 BE: len][payload bytes of len]
//! ```
//!
//! A connection runs:
//! 1. publisher -> subscriber: `Hello` (JSON) naming the channel
//! 2. subscriber -> publisher: empty ack frame if the name matches, otherwise
//!    the connection is closed without a reply
//! 3. publisher -> subscriber: message payload
//! 4. subscriber -> publisher: empty ack frame once the message is queued for dispatch
//!
//! Steps 3 and 4 may repeat. Only a peer that already knows the channel name
//! gets past step 1, and a publisher reaching an unrelated listener through a
//! stale endpoint record never gets the step 2 ack.

use crate::config::ChannelConfig;
use crate::{RelayError, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Greeting a publisher sends before anything else on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub channel: String,
    pub pid: u32,
}

impl Hello {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            pid: std::process::id(),
        }
    }
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > ChannelConfig::MAX_MESSAGE_SIZE {
        return Err(RelayError::Validation {
            field: "channel_frame".to_string(),
            message: format!(
                "Message size {} exceeds maximum {}",
                len,
                ChannelConfig::MAX_MESSAGE_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > ChannelConfig::MAX_MESSAGE_SIZE {
        return Err(RelayError::Validation {
            field: "channel_frame".to_string(),
            message: format!(
                "Message size {} exceeds maximum {}",
                payload.len(),
                ChannelConfig::MAX_MESSAGE_SIZE
            ),
        });
    }

    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
