//! The stream transport seam.
//!
//! The throughput engine is transport-agnostic: it drives a client-to-server
//! frame stream with per-frame acknowledgements through the traits below, and
//! the two concrete bindings ([`tcp`], [`uds`]) are interchangeable behind
//! them. Each side of a stream is split into an outbound and an inbound half
//! so the driving loop and the delivery loop can run concurrently without
//! sharing a connection object.
//!
//! Delivery contract, both directions: zero or more items, then exactly one
//! terminal outcome - a clean end-of-stream (`Ok(None)`) or an error, never
//! both. Sending on a failed connection fails loudly rather than dropping
//! data silently.

pub mod tcp;
pub mod uds;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::BenchConfig;
use crate::error::StreamError;
use crate::framing;
use crate::protocol::{Ack, Frame, WireMessage, DATA_HEADER_LEN};

/// Outbound half of a client stream: sequenced frames, then a half-close.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), StreamError>;

    /// Signals end-of-stream to the peer. The connection stays open for
    /// trailing acknowledgements.
    async fn half_close(&mut self) -> Result<(), StreamError>;
}

/// Inbound half of a client stream: acknowledgements until the peer
/// completes or fails.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AckSource: Send {
    async fn recv(&mut self) -> Result<Option<Ack>, StreamError>;
}

/// Inbound half of a server stream.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FrameSource: Send {
    async fn recv(&mut self) -> Result<Option<Frame>, StreamError>;
}

/// Outbound half of a server stream.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AckSink: Send {
    async fn send(&mut self, ack: Ack) -> Result<(), StreamError>;
}

pub struct StreamPair {
    pub sink: Box<dyn FrameSink>,
    pub acks: Box<dyn AckSource>,
}

pub struct ServerStream {
    pub frames: Box<dyn FrameSource>,
    pub acks: Box<dyn AckSink>,
    /// Human-readable peer identity, for logging only.
    pub peer: String,
}

#[async_trait]
pub trait StreamListener: Send {
    async fn accept(&mut self) -> Result<ServerStream, StreamError>;

    /// The bound address in the same syntax `open` accepts as a target.
    fn local_addr(&self) -> String;
}

#[async_trait]
pub trait StreamTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open(&self, target: &str) -> Result<StreamPair, StreamError>;

    async fn bind(&self, listen: &str) -> Result<Box<dyn StreamListener>, StreamError>;
}

/// Which transport binding to benchmark.
#[derive(Debug, Clone, Copy, Eq, PartialEq, clap::ValueEnum)]
pub enum TransportKind {
    Tcp,
    Uds,
}

impl TransportKind {
    pub fn create(&self, config: &BenchConfig) -> Box<dyn StreamTransport> {
        match self {
            TransportKind::Tcp => Box::new(tcp::TcpTransport::new(config)),
            TransportKind::Uds => Box::new(uds::UdsTransport::new(config)),
        }
    }
}

// ---------------------------------------------------------------------------
// shared framed adapters - both bindings are byte streams, so the four halves
// are implemented once over AsyncRead / AsyncWrite
// ---------------------------------------------------------------------------

pub(crate) struct FramedFrameSink<W> {
    writer: W,
}

impl<W> FramedFrameSink<W> {
    pub(crate) fn new(writer: W) -> FramedFrameSink<W> {
        FramedFrameSink { writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameSink for FramedFrameSink<W> {
    async fn send(&mut self, frame: Frame) -> Result<(), StreamError> {
        framing::write_frame(&mut self.writer, &frame).await
    }

    async fn half_close(&mut self) -> Result<(), StreamError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

pub(crate) struct FramedAckSource<R> {
    reader: R,
    max_message_len: usize,
}

impl<R> FramedAckSource<R> {
    pub(crate) fn new(reader: R, max_message_len: usize) -> FramedAckSource<R> {
        FramedAckSource { reader, max_message_len }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> AckSource for FramedAckSource<R> {
    async fn recv(&mut self) -> Result<Option<Ack>, StreamError> {
        match framing::read_message(&mut self.reader, self.max_message_len).await? {
            None => Ok(None),
            Some(WireMessage::Ack(ack)) => Ok(Some(ack)),
            Some(WireMessage::Data(frame)) => Err(StreamError::protocol(
                format!("received data frame {} on the acknowledgement channel", frame.sequence),
            )),
        }
    }
}

pub(crate) struct FramedFrameSource<R> {
    reader: R,
    max_message_len: usize,
}

impl<R> FramedFrameSource<R> {
    pub(crate) fn new(reader: R, max_message_len: usize) -> FramedFrameSource<R> {
        FramedFrameSource { reader, max_message_len }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameSource for FramedFrameSource<R> {
    async fn recv(&mut self) -> Result<Option<Frame>, StreamError> {
        match framing::read_message(&mut self.reader, self.max_message_len).await? {
            None => Ok(None),
            Some(WireMessage::Data(frame)) => Ok(Some(frame)),
            Some(WireMessage::Ack(ack)) => Err(StreamError::protocol(
                format!("received acknowledgement {} on the data channel", ack.sequence),
            )),
        }
    }
}

pub(crate) struct FramedAckSink<W> {
    writer: W,
}

impl<W> FramedAckSink<W> {
    pub(crate) fn new(writer: W) -> FramedAckSink<W> {
        FramedAckSink { writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> AckSink for FramedAckSink<W> {
    async fn send(&mut self, ack: Ack) -> Result<(), StreamError> {
        framing::write_ack(&mut self.writer, &ack).await
    }
}

/// The framing layer's message size limit for a given payload limit.
pub(crate) fn max_message_len(config: &BenchConfig) -> usize {
    config.max_payload_bytes + DATA_HEADER_LEN
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_client_halves_reject_misdirected_messages() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let (client_side, server_side) = tokio::io::duplex(1024);
            let (client_read, _keep_client_write) = tokio::io::split(client_side);
            let (_keep_server_read, server_write) = tokio::io::split(server_side);

            // a data frame arriving where acks are expected is corruption
            let mut sink = FramedFrameSink::new(server_write);
            sink.send(Frame { sequence: 0, payload: Bytes::from_static(b"x") }).await.unwrap();

            let mut acks = FramedAckSource::new(client_read, 1024);
            let actual = acks.recv().await;
            assert!(matches!(actual, Err(StreamError::ProtocolViolation(_))));
        });
    }

    #[rstest]
    fn test_server_halves_reject_misdirected_messages() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let (client_side, server_side) = tokio::io::duplex(1024);
            let (_keep_client_read, client_write) = tokio::io::split(client_side);
            let (server_read, _keep_server_write) = tokio::io::split(server_side);

            let mut sink = FramedAckSink::new(client_write);
            sink.send(Ack { sequence: 4, ok: true }).await.unwrap();

            let mut frames = FramedFrameSource::new(server_read, 1024);
            let actual = frames.recv().await;
            assert!(matches!(actual, Err(StreamError::ProtocolViolation(_))));
        });
    }

    #[rstest]
    fn test_half_close_yields_clean_eof_for_the_peer() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let (client_side, server_side) = tokio::io::duplex(1024);
            let (_client_read, client_write) = tokio::io::split(client_side);
            let (server_read, _server_write) = tokio::io::split(server_side);

            let mut sink = FramedFrameSink::new(client_write);
            sink.send(Frame { sequence: 0, payload: Bytes::from_static(b"abc") }).await.unwrap();
            sink.half_close().await.unwrap();

            let mut frames = FramedFrameSource::new(server_read, 1024);
            assert!(frames.recv().await.unwrap().is_some());
            assert!(frames.recv().await.unwrap().is_none());
        });
    }
}
