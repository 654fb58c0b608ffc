//! Server-side: accept loop and the per-stream serving engine.
//!
//! The serving loop is the receiving role of the protocol: count each frame,
//! acknowledge it synchronously, complete when the client half-closes. Each
//! connection gets its own session and sampler; nothing is shared across
//! streams.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::BenchConfig;
use crate::error::StreamError;
use crate::protocol::Ack;
use crate::report::{self, ConsoleReporter};
use crate::sampler::RateSampler;
use crate::session::StreamSession;
use crate::transport::{ServerStream, StreamListener, StreamTransport};

/// Binds the transport and serves streams until the process is interrupted.
pub async fn run_server(
    transport: &dyn StreamTransport,
    listen: &str,
    config: BenchConfig,
) -> anyhow::Result<()> {
    let listener = transport.bind(listen).await?;
    println!("{} server listening on {}", transport.name(), listener.local_addr());

    tokio::select! {
        result = serve(listener, transport.name(), config) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, stopping server");
        }
    }
    Ok(())
}

/// Accepts connections forever, one serving task per stream.
pub async fn serve(
    mut listener: Box<dyn StreamListener>,
    impl_name: &'static str,
    config: BenchConfig,
) -> Result<(), StreamError> {
    loop {
        let stream = listener.accept().await?;
        info!("accepted stream from {}", stream.peer);

        let config = config.clone();
        tokio::spawn(async move {
            let peer = stream.peer.clone();
            if let Err(e) = serve_stream(stream, impl_name, &config).await {
                warn!("stream from {} failed: {}", peer, e);
            }
        });
    }
}

/// Drives one inbound stream to its terminal state. The summary is printed
/// on graceful completion only; a failed stream surfaces its error instead.
pub(crate) async fn serve_stream(
    mut stream: ServerStream,
    impl_name: &'static str,
    config: &BenchConfig,
) -> Result<(), StreamError> {
    let session = Arc::new(StreamSession::new());

    let sampler = RateSampler::new(session.clone(), config.sample_interval);
    let sampler_task = tokio::spawn(sampler.run(Box::new(ConsoleReporter::new("server", impl_name))));

    let outcome = loop {
        match stream.frames.recv().await {
            Ok(Some(frame)) => {
                session.record_transfer(frame.payload.len() as u64);
                if let Err(e) = stream.acks.send(Ack { sequence: frame.sequence, ok: true }).await {
                    break Err(e);
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    match outcome {
        Ok(()) => {
            let elapsed = session.elapsed();
            session.finish();
            let _ = sampler_task.await;

            let totals = session.totals();
            debug!("stream completed: {} messages, {} bytes", totals.messages, totals.bytes);
            report::summary("server", impl_name, &totals, elapsed);
            Ok(())
        }
        Err(e) => {
            session.record_error(e.clone());
            session.finish();
            let _ = sampler_task.await;
            Err(e)
        }
    }
}
