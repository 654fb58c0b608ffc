//! TCP binding: one connection per stream, length-delimited messages,
//! `TCP_NODELAY` so small acknowledgements are not held back by the kernel.

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::config::BenchConfig;
use crate::error::StreamError;
use crate::transport::{
    max_message_len, FramedAckSink, FramedAckSource, FramedFrameSink, FramedFrameSource,
    ServerStream, StreamListener, StreamPair, StreamTransport,
};

pub struct TcpTransport {
    max_message_len: usize,
}

impl TcpTransport {
    pub fn new(config: &BenchConfig) -> TcpTransport {
        TcpTransport {
            max_message_len: max_message_len(config),
        }
    }
}

#[async_trait]
impl StreamTransport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn open(&self, target: &str) -> Result<StreamPair, StreamError> {
        let addr = normalize_target(target);
        debug!("opening tcp stream to {}", addr);

        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        Ok(StreamPair {
            sink: Box::new(FramedFrameSink::new(write_half)),
            acks: Box::new(FramedAckSource::new(read_half, self.max_message_len)),
        })
    }

    async fn bind(&self, listen: &str) -> Result<Box<dyn StreamListener>, StreamError> {
        let addr = normalize_listen(listen);
        let listener = TcpListener::bind(&addr).await?;
        Ok(Box::new(TcpStreamListener {
            listener,
            max_message_len: self.max_message_len,
        }))
    }
}

struct TcpStreamListener {
    listener: TcpListener,
    max_message_len: usize,
}

#[async_trait]
impl StreamListener for TcpStreamListener {
    async fn accept(&mut self) -> Result<ServerStream, StreamError> {
        let (stream, peer_addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        Ok(ServerStream {
            frames: Box::new(FramedFrameSource::new(read_half, self.max_message_len)),
            acks: Box::new(FramedAckSink::new(write_half)),
            peer: peer_addr.to_string(),
        })
    }

    fn local_addr(&self) -> String {
        self.listener.local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unbound>".to_string())
    }
}

/// Accepts `host:port` as well as an `http://host[:port]` URL (port defaults
/// to 80 when the URL leaves it out).
fn normalize_target(target: &str) -> String {
    let stripped = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))
        .map(|rest| rest.trim_end_matches('/'));

    match stripped {
        None => target.to_string(),
        Some(host_port) if host_port.contains(':') => host_port.to_string(),
        Some(host) => format!("{}:80", host),
    }
}

/// A bare port number listens on all interfaces, anything else is taken as a
/// full listen address.
fn normalize_listen(listen: &str) -> String {
    match listen.parse::<u16>() {
        Ok(port) => format!("0.0.0.0:{}", port),
        Err(_) => listen.to_string(),
    }
}
