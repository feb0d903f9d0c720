//! Length-prefixed framing for TCP streams.
//!
//! Every message on the wire is a length-prefixed frame:
//!
//! ```text
//! +-------------------+--------------------+
//! | length (2 bytes)  |   payload          |
//! | u16 big-endian    |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! The length does **not** include the 2 prefix bytes themselves, and the
//! payload decodes to exactly one [`Message`] (see [`crate::messages`]).
//! Payloads longer than [`MAX_FRAME_LEN`] are refused on encode rather than
//! truncated.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::messages::{Message, MessageError, deserialize_message, serialize_message};

/// Size of the length prefix in bytes.
pub const HEADER_LEN: usize = 2;

/// Largest payload a frame can carry.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Errors that can occur during framing operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The encoded payload does not fit in a `u16` length prefix.
    #[error("payload size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// The actual payload size.
        size: usize,
        /// The frame ceiling.
        max: usize,
    },

    /// The bytes do not form a known message.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The stream ended before a complete frame was read.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MessageError> for FrameError {
    fn from(err: MessageError) -> Self {
        FrameError::MalformedFrame(err.to_string())
    }
}

/// Prefix `payload` with its big-endian length.
pub fn frame_payload(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::FrameTooLarge {
        size: payload.len(),
        max: MAX_FRAME_LEN,
    })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encode a message into a complete frame (prefix + payload).
pub fn encode(msg: &Message) -> Result<Vec<u8>, FrameError> {
    let payload = serialize_message(msg)?;
    frame_payload(&payload)
}

/// Decode a complete frame produced by [`encode`].
///
/// The declared length must match the bytes that follow it exactly.
pub fn decode(frame: &[u8]) -> Result<Message, FrameError> {
    if frame.len() < HEADER_LEN {
        return Err(FrameError::MalformedFrame(format!(
            "{} bytes is too short for a length prefix",
            frame.len()
        )));
    }

    let (header, payload) = frame.split_at(HEADER_LEN);
    let declared = usize::from(u16::from_be_bytes([header[0], header[1]]));
    if declared != payload.len() {
        return Err(FrameError::MalformedFrame(format!(
            "length prefix says {declared} bytes but {} follow",
            payload.len()
        )));
    }

    Ok(deserialize_message(payload)?)
}

fn closed_on_eof(err: std::io::Error) -> FrameError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(err)
    }
}

/// Read a single frame from the stream and decode it.
///
/// Suspends until the full frame is available. Returns
/// [`FrameError::ConnectionClosed`] if the peer closes the connection before
/// the frame is complete. A [`FrameError::MalformedFrame`] leaves the stream
/// positioned at the next frame boundary.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Message, FrameError> {
    let mut len_buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut len_buf).await.map_err(closed_on_eof)?;

    let payload_len = usize::from(u16::from_be_bytes(len_buf));
    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await.map_err(closed_on_eof)?;
    }

    Ok(deserialize_message(&payload)?)
}

/// Encode `msg` and write prefix and payload in one `write_all`.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg: &Message,
) -> Result<(), FrameError> {
    let frame = encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Address, Payload, PROTOCOL_VERSION};
    use tokio::io::duplex;

    #[test]
    fn test_payload_at_ceiling_is_accepted() {
        let payload = vec![0xAB; MAX_FRAME_LEN];
        let frame = frame_payload(&payload).unwrap();
        assert_eq!(frame.len(), HEADER_LEN + MAX_FRAME_LEN);
        assert_eq!(&frame[..2], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_payload_over_ceiling_is_rejected() {
        let payload = vec![0u8; MAX_FRAME_LEN + 1];
        let result = frame_payload(&payload);
        assert!(matches!(
            result,
            Err(FrameError::FrameTooLarge {
                size: 65536,
                max: 65535
            })
        ));
    }

    #[test]
    fn test_oversized_message_is_rejected_on_encode() {
        let msg = Message::say("x".repeat(MAX_FRAME_LEN));
        assert!(matches!(
            encode(&msg),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_length_prefix_is_big_endian() {
        let frame = encode(&Message::say("hello")).unwrap();
        let declared = u16::from_be_bytes([frame[0], frame[1]]) as usize;
        assert_eq!(declared, frame.len() - HEADER_LEN);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let mut msg = Message::ping(Address(3), 99);
        msg.source = Address(1);
        let frame = encode(&msg).unwrap();
        assert_eq!(decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let mut frame = encode(&Message::say("hello")).unwrap();
        frame.push(0);
        assert!(matches!(decode(&frame), Err(FrameError::MalformedFrame(_))));
        assert!(matches!(decode(&[0x00]), Err(FrameError::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn test_single_message_roundtrip() {
        let (mut client, mut server) = duplex(8192);
        let msg = Message::say("hello world");

        write_frame(&mut client, &msg).await.unwrap();
        let received = read_frame(&mut server).await.unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn test_back_to_back_messages_dont_merge() {
        let (mut client, mut server) = duplex(8192);

        write_frame(&mut client, &Message::say("aaa")).await.unwrap();
        write_frame(&mut client, &Message::new(Payload::Quit))
            .await
            .unwrap();

        assert_eq!(read_frame(&mut server).await.unwrap(), Message::say("aaa"));
        assert_eq!(
            read_frame(&mut server).await.unwrap(),
            Message::new(Payload::Quit)
        );
    }

    #[tokio::test]
    async fn test_partial_read_resumes_correctly() {
        // duplex with a tiny buffer forces partial writes/reads
        let (mut client, mut server) = duplex(8);
        let msg = Message::say("this message is larger than the buffer");

        let expected = msg.clone();
        let write_task = tokio::spawn(async move {
            write_frame(&mut client, &msg).await.unwrap();
        });

        let received = read_frame(&mut server).await.unwrap();
        write_task.await.unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_connection_closed_during_length_read() {
        let (client, mut server) = duplex(8192);
        drop(client);

        let result = read_frame(&mut server).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_connection_closed_mid_payload() {
        let (mut client, mut server) = duplex(8192);
        client.write_all(&[0x00, 0x10, 1, 2, 3]).await.unwrap();
        drop(client);

        let result = read_frame(&mut server).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_malformed_payload_keeps_stream_aligned() {
        let (mut client, mut server) = duplex(8192);
        client
            .write_all(&[0x00, 0x03, PROTOCOL_VERSION, 0x00, 0x7F])
            .await
            .unwrap();
        write_frame(&mut client, &Message::say("next")).await.unwrap();

        let first = read_frame(&mut server).await;
        assert!(matches!(first, Err(FrameError::MalformedFrame(_))));
        assert_eq!(read_frame(&mut server).await.unwrap(), Message::say("next"));
    }

    #[tokio::test]
    async fn test_zero_length_frame_is_malformed() {
        let (mut client, mut server) = duplex(8192);
        client.write_all(&[0x00, 0x00]).await.unwrap();

        let result = read_frame(&mut server).await;
        assert!(matches!(result, Err(FrameError::MalformedFrame(_))));
    }
}
