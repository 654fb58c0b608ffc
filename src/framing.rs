//! Length-delimited message framing over any byte stream.
//!
//! Every protocol message is preceded by a `u32` BE length covering the rest
//! of the message. Both transport bindings share this codec; they differ only
//! in the kind of socket underneath.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::StreamError;
use crate::protocol::{Ack, Frame, WireMessage};

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), StreamError>
where
    W: AsyncWrite + Unpin + Send,
{
    let wire_len = frame.wire_len();
    if wire_len > u32::MAX as usize {
        return Err(StreamError::protocol(format!("frame of {} bytes exceeds the wire format limit", wire_len)));
    }

    let mut header = BytesMut::with_capacity(4 + crate::protocol::DATA_HEADER_LEN);
    header.extend_from_slice(&(wire_len as u32).to_be_bytes());
    frame.ser_header(&mut header);

    writer.write_all(&header).await?;
    writer.write_all(&frame.payload).await?;
    Ok(())
}

pub async fn write_ack<W>(writer: &mut W, ack: &Ack) -> Result<(), StreamError>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut buf = BytesMut::with_capacity(4 + Ack::SERIALIZED_LEN);
    buf.extend_from_slice(&(Ack::SERIALIZED_LEN as u32).to_be_bytes());
    ack.ser(&mut buf);

    writer.write_all(&buf).await?;
    Ok(())
}

/// Reads the next message, or `None` on a clean end-of-stream.
///
/// EOF is only clean on a message boundary - a connection that dies in the
/// middle of a length prefix or message body is a transport failure, not a
/// graceful half-close.
pub async fn read_message<R>(reader: &mut R, max_message_len: usize) -> Result<Option<WireMessage>, StreamError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(StreamError::transport("connection closed inside a length prefix"));
        }
        filled += n;
    }

    let message_len = u32::from_be_bytes(len_buf) as usize;
    if message_len > max_message_len {
        return Err(StreamError::protocol(format!(
            "received a message of {} bytes, longer than the configured maximum of {} - closing the stream because it is apparently corrupt",
            message_len, max_message_len
        )));
    }

    let mut buf = BytesMut::zeroed(message_len);
    reader.read_exact(&mut buf).await
        .map_err(|e| StreamError::transport(format!("connection closed inside a message body: {}", e)))?;

    WireMessage::try_deser(&mut buf.freeze()).map(Some)
}
