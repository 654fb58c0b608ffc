//! Client-side run orchestration.
//!
//! A run spawns three cooperating tasks over one stream: the sender (driving
//! context), the acknowledgement collector (delivery context) and the rate
//! sampler (timer context). The caller then waits on the terminal latch,
//! bounded by the run timeout - a peer that says nothing is a failure, not a
//! hang.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::RngCore;
use tracing::{debug, info};

use crate::collector::AckCollector;
use crate::config::BenchConfig;
use crate::credit::CreditWindow;
use crate::error::StreamError;
use crate::report::{self, ConsoleReporter};
use crate::sampler::RateSampler;
use crate::sender::StreamingSender;
use crate::session::{InFlightSet, StreamSession};
use crate::transport::{StreamPair, StreamTransport};

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunTotals {
    pub messages: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Opens a stream over the given transport and drives the full benchmark:
/// `num_messages` frames of `payload_bytes` each, counted by acknowledgement.
/// Prints per-second ticks while running and the summary once, on success.
pub async fn run_client(
    transport: &dyn StreamTransport,
    target: &str,
    num_messages: u64,
    payload_bytes: usize,
    config: &BenchConfig,
) -> Result<RunTotals, StreamError> {
    info!("connecting to {} via {}", target, transport.name());
    let pair = transport.open(target).await?;

    let totals = drive_stream(pair, transport.name(), num_messages, payload_bytes, config).await?;

    report::summary(
        "client",
        transport.name(),
        &crate::session::Totals {
            messages: totals.messages,
            bytes: totals.bytes,
            last_payload_bytes: payload_bytes as u64,
        },
        totals.elapsed,
    );
    Ok(totals)
}

/// The transport-independent part of a client run, factored out so it can be
/// exercised against scripted stream halves.
pub(crate) async fn drive_stream(
    pair: StreamPair,
    impl_name: &'static str,
    num_messages: u64,
    payload_bytes: usize,
    config: &BenchConfig,
) -> Result<RunTotals, StreamError> {
    let session = Arc::new(StreamSession::new());
    let window = Arc::new(CreditWindow::with_budget(
        config.window_budget_bytes,
        payload_bytes as u64,
        config.credit_cap,
    ));
    let in_flight = Arc::new(InFlightSet::default());
    debug!(
        "stream opened: {} messages of {} bytes, window capacity {}",
        num_messages, payload_bytes, window.capacity(),
    );

    let sampler = RateSampler::new(session.clone(), config.sample_interval);
    let sampler_task = tokio::spawn(sampler.run(Box::new(ConsoleReporter::new("client", impl_name))));

    let collector = AckCollector::new(session.clone(), window.clone(), in_flight.clone(), payload_bytes as u64);
    let collector_task = tokio::spawn(collector.run(pair.acks));

    let sender = StreamingSender::new(session.clone(), window.clone(), in_flight.clone());
    let sender_task = tokio::spawn(sender.run(pair.sink, num_messages, Bytes::from(build_payload(payload_bytes))));

    if tokio::time::timeout(config.run_timeout, session.wait_terminal()).await.is_err() {
        session.record_error(StreamError::Timeout(config.run_timeout));
        window.close();
        session.finish();
    }

    // terminal: nothing below may outlive the stream. On a clean run both
    // loops have already returned and abort is a no-op.
    sender_task.abort();
    collector_task.abort();
    let _ = sender_task.await;
    let _ = collector_task.await;
    // the sampler stops via the latch; joining it guarantees no tick is
    // printed after the summary
    let _ = sampler_task.await;

    if let Some(error) = session.error() {
        return Err(error.clone());
    }

    let totals = session.totals();
    Ok(RunTotals {
        messages: totals.messages,
        bytes: totals.bytes,
        elapsed: session.elapsed(),
    })
}

/// The payload is built once per run and shared by every frame. Random fill,
/// so a transport cannot cheat by compressing away an all-zero buffer.
fn build_payload(payload_bytes: usize) -> Vec<u8> {
    let mut payload = vec![0u8; payload_bytes];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}
