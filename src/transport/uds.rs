//! Unix domain socket binding: same framing as TCP without the IP stack,
//! which makes it the natural baseline when client and server share a host.
//! The target / listen address is a filesystem path.

use async_trait::async_trait;
use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

use crate::config::BenchConfig;
use crate::error::StreamError;
use crate::transport::{
    max_message_len, FramedAckSink, FramedAckSource, FramedFrameSink, FramedFrameSource,
    ServerStream, StreamListener, StreamPair, StreamTransport,
};

pub struct UdsTransport {
    max_message_len: usize,
}

impl UdsTransport {
    pub fn new(config: &BenchConfig) -> UdsTransport {
        UdsTransport {
            max_message_len: max_message_len(config),
        }
    }
}

#[async_trait]
impl StreamTransport for UdsTransport {
    fn name(&self) -> &'static str {
        "uds"
    }

    async fn open(&self, target: &str) -> Result<StreamPair, StreamError> {
        debug!("opening unix stream to {}", target);
        let stream = UnixStream::connect(target).await?;

        let (read_half, write_half) = stream.into_split();
        Ok(StreamPair {
            sink: Box::new(FramedFrameSink::new(write_half)),
            acks: Box::new(FramedAckSource::new(read_half, self.max_message_len)),
        })
    }

    async fn bind(&self, listen: &str) -> Result<Box<dyn StreamListener>, StreamError> {
        // a socket file left behind by an earlier run would make bind fail
        if std::fs::remove_file(listen).is_ok() {
            debug!("removed stale socket file {}", listen);
        }

        let listener = UnixListener::bind(listen)?;
        Ok(Box::new(UdsStreamListener {
            listener,
            path: listen.to_string(),
            max_message_len: self.max_message_len,
        }))
    }
}

struct UdsStreamListener {
    listener: UnixListener,
    path: String,
    max_message_len: usize,
}

#[async_trait]
impl StreamListener for UdsStreamListener {
    async fn accept(&mut self) -> Result<ServerStream, StreamError> {
        let (stream, _) = self.listener.accept().await?;

        let (read_half, write_half) = stream.into_split();
        Ok(ServerStream {
            frames: Box::new(FramedFrameSource::new(read_half, self.max_message_len)),
            acks: Box::new(FramedAckSink::new(write_half)),
            peer: self.path.clone(),
        })
    }

    fn local_addr(&self) -> String {
        self.path.clone()
    }
}

impl Drop for UdsStreamListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn scratch_socket_path(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("streambench-{}-{}.sock", tag, std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    #[rstest]
    fn test_bind_connect_and_cleanup() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let path = scratch_socket_path("bind");
            let config = BenchConfig::default();
            let transport = UdsTransport::new(&config);

            let listener = transport.bind(&path).await.unwrap();
            assert_eq!(listener.local_addr(), path);

            transport.open(&path).await.unwrap();

            drop(listener);
            assert!(!std::path::Path::new(&path).exists(), "socket file must be removed on drop");
        });
    }

    #[rstest]
    fn test_rebind_over_stale_socket_file() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let path = scratch_socket_path("stale");
            let config = BenchConfig::default();
            let transport = UdsTransport::new(&config);

            let first = transport.bind(&path).await.unwrap();
            // simulate a crashed run: the file stays, the listener is gone
            std::mem::forget(first);

            let second = transport.bind(&path).await;
            assert!(second.is_ok());

            drop(second);
            let _ = std::fs::remove_file(&path);
        });
    }
}
