use std::fmt::{Debug, Formatter};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::Crc;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::StreamError;

/// Hard upper bound for a single payload. The CLI clamps requested sizes to
/// this, and receivers reject anything bigger as a corrupt length prefix.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Wire overhead of a data message after the length prefix: kind tag,
/// checksum, sequence number.
pub const DATA_HEADER_LEN: usize = 1 + 8 + 8;

/// On-the-wire message discriminant, the first byte after the length prefix.
#[derive(Debug, Clone, Copy, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    Data = 0,
    Ack = 1,
}

/// A single sequenced payload chunk, client to server.
///
/// Owned by the sender until handed to the transport; the payload is a
/// cheaply clonable [`Bytes`] so the one buffer allocated per run is shared
/// by every frame.
#[derive(Clone, Eq, PartialEq)]
pub struct Frame {
    pub sequence: u64,
    pub payload: Bytes,
}

impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame[seq={}, {} bytes]", self.sequence, self.payload.len())
    }
}

/// Per-frame receipt confirmation, server to client. `sequence` names the
/// frame it confirms; arrival order is not guaranteed to match send order.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Ack {
    pub sequence: u64,
    pub ok: bool,
}

/// Checksum over a message's header fields (not the payload - payload
/// integrity is the stream transport's concern, and hashing every chunk
/// would dominate the measurement).
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct HeaderChecksum(pub u64);

impl Debug for HeaderChecksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x?}", self.0)
    }
}

impl HeaderChecksum {
    pub fn new(kind: MessageKind, sequence: u64, arg: u64) -> HeaderChecksum {
        let hasher = Crc::<u64>::new(&crc::CRC_64_REDIS);
        let mut digest = hasher.digest();

        digest.update(&[u8::from(kind)]);
        digest.update(&sequence.to_be_bytes());
        digest.update(&arg.to_be_bytes());

        HeaderChecksum(digest.finalize())
    }
}

impl Frame {
    /// Serializes the frame header; the payload itself is written separately
    /// so it is never copied into an intermediate buffer.
    pub fn ser_header(&self, buf: &mut BytesMut) {
        buf.put_u8(MessageKind::Data.into());
        buf.put_u64(HeaderChecksum::new(MessageKind::Data, self.sequence, self.payload.len() as u64).0);
        buf.put_u64(self.sequence);
    }

    pub fn wire_len(&self) -> usize {
        DATA_HEADER_LEN + self.payload.len()
    }
}

impl Ack {
    pub const SERIALIZED_LEN: usize = 1 + 8 + 8 + 1;

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(MessageKind::Ack.into());
        buf.put_u64(HeaderChecksum::new(MessageKind::Ack, self.sequence, self.ok as u64).0);
        buf.put_u64(self.sequence);
        buf.put_u8(self.ok as u8);
    }
}

/// A fully decoded inbound message.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WireMessage {
    Data(Frame),
    Ack(Ack),
}

impl WireMessage {
    /// Decodes one message from a length-delimited buffer. The buffer must
    /// contain exactly one message; for data frames the payload is the
    /// remainder of the buffer, sliced without copying.
    pub fn try_deser(buf: &mut Bytes) -> Result<WireMessage, StreamError> {
        let kind = buf.try_get_u8()
            .map_err(|_| StreamError::protocol("empty message"))?;
        let kind = MessageKind::try_from(kind)
            .map_err(|_| StreamError::protocol(format!("unknown message kind {}", kind)))?;

        let checksum = HeaderChecksum(buf.try_get_u64()
            .map_err(|_| StreamError::protocol("truncated message header"))?);
        let sequence = buf.try_get_u64()
            .map_err(|_| StreamError::protocol("truncated message header"))?;

        match kind {
            MessageKind::Data => {
                let payload = buf.copy_to_bytes(buf.remaining());
                if checksum != HeaderChecksum::new(kind, sequence, payload.len() as u64) {
                    return Err(StreamError::protocol(format!("header checksum mismatch for frame {}", sequence)));
                }
                Ok(WireMessage::Data(Frame { sequence, payload }))
            }
            MessageKind::Ack => {
                let ok = buf.try_get_u8()
                    .map_err(|_| StreamError::protocol("truncated ack"))? != 0;
                if checksum != HeaderChecksum::new(kind, sequence, ok as u64) {
                    return Err(StreamError::protocol(format!("header checksum mismatch for ack {}", sequence)));
                }
                Ok(WireMessage::Ack(Ack { sequence, ok }))
            }
        }
    }
}
