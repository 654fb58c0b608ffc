//! Periodic throughput sampling.
//!
//! The sampler reads the session's running totals on a fixed period and
//! reports the delta since its previous observation. All rate math is based
//! on actually elapsed time, never on tick counts, so a delayed or skipped
//! tick yields a correct (averaged) figure instead of a spike.

use std::sync::Arc;
use std::time::Duration;

#[cfg(test)] use mockall::automock;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::session::StreamSession;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// One per-second observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Whole seconds since the stream opened.
    pub elapsed_secs: u64,
    /// Throughput over the sampled window, MiB per second. Never negative,
    /// and zero (not NaN) when no time passed.
    pub mbps: f64,
    pub delta_messages: u64,
    pub delta_mib: f64,
}

/// Where samples go, introduced to keep the console out of the sampling
/// logic and to facilitate testing.
#[cfg_attr(test, automock)]
pub trait SampleSink: Send {
    fn on_sample(&mut self, sample: &Sample);
}

pub struct RateSampler {
    session: Arc<StreamSession>,
    period: Duration,
}

impl RateSampler {
    pub fn new(session: Arc<StreamSession>, period: Duration) -> RateSampler {
        RateSampler { session, period }
    }

    /// Samples until the session's terminal latch fires, then returns.
    /// Nothing is ever emitted after termination.
    pub async fn run(self, mut sink: Box<dyn SampleSink>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of a fresh interval completes immediately
        ticker.tick().await;

        let mut last_time = Instant::now();
        let mut last_bytes = 0u64;
        let mut last_messages = 0u64;

        loop {
            tokio::select! {
                _ = self.session.wait_terminal() => return,
                _ = ticker.tick() => {}
            }

            let now = Instant::now();
            let elapsed = (now - last_time).as_secs_f64();
            let (bytes, messages) = self.session.counters();

            let delta_bytes = bytes - last_bytes;
            let delta_messages = messages - last_messages;
            let mbps = if elapsed > 0.0 {
                (delta_bytes as f64 / BYTES_PER_MIB) / elapsed
            } else {
                0.0
            };

            sink.on_sample(&Sample {
                elapsed_secs: self.session.elapsed().as_secs(),
                mbps,
                delta_messages,
                delta_mib: delta_bytes as f64 / BYTES_PER_MIB,
            });

            last_time = now;
            last_bytes = bytes;
            last_messages = messages;
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use tokio::sync::mpsc;

    use super::*;

    struct ChannelSink(mpsc::UnboundedSender<Sample>);

    impl SampleSink for ChannelSink {
        fn on_sample(&mut self, sample: &Sample) {
            self.0.send(sample.clone()).ok();
        }
    }

    fn paused_rt() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build().unwrap()
    }

    #[rstest]
    fn test_sample_reflects_delta_over_elapsed_time() {
        paused_rt().block_on(async {
            let session = Arc::new(StreamSession::new());
            let (tx, mut rx) = mpsc::unbounded_channel();

            let sampler = RateSampler::new(session.clone(), Duration::from_secs(1));
            let handle = tokio::spawn(sampler.run(Box::new(ChannelSink(tx))));

            session.record_transfer(BYTES_PER_MIB as u64);
            tokio::time::sleep(Duration::from_millis(1100)).await;

            let sample = rx.recv().await.unwrap();
            assert_eq!(sample.delta_messages, 1);
            assert!((sample.mbps - 1.0).abs() < 1e-6, "expected 1 MB/s, got {}", sample.mbps);
            assert!((sample.delta_mib - 1.0).abs() < 1e-6);
            assert_eq!(sample.elapsed_secs, 1);

            session.finish();
            handle.await.unwrap();
        });
    }

    #[rstest]
    fn test_consecutive_ticks_never_double_count() {
        paused_rt().block_on(async {
            let session = Arc::new(StreamSession::new());
            let (tx, mut rx) = mpsc::unbounded_channel();

            let sampler = RateSampler::new(session.clone(), Duration::from_secs(1));
            let handle = tokio::spawn(sampler.run(Box::new(ChannelSink(tx))));

            session.record_transfer(2 * BYTES_PER_MIB as u64);
            tokio::time::sleep(Duration::from_millis(1100)).await;
            let first = rx.recv().await.unwrap();
            assert_eq!(first.delta_messages, 1);
            assert!((first.delta_mib - 2.0).abs() < 1e-6);

            // no traffic in the second window: the delta must be zero, not repeated
            tokio::time::sleep(Duration::from_secs(1)).await;
            let second = rx.recv().await.unwrap();
            assert_eq!(second.delta_messages, 0);
            assert!(second.mbps.abs() < 1e-6);
            assert!(second.mbps >= 0.0);

            session.finish();
            handle.await.unwrap();
        });
    }

    #[rstest]
    fn test_sampler_stops_on_termination_without_emitting() {
        paused_rt().block_on(async {
            let session = Arc::new(StreamSession::new());

            // a mock with no expectations verifies that nothing is emitted
            let sink = MockSampleSink::new();

            let sampler = RateSampler::new(session.clone(), Duration::from_secs(1));
            let handle = tokio::spawn(sampler.run(Box::new(sink)));

            session.finish();
            handle.await.unwrap();
        });
    }

    #[rstest]
    fn test_no_samples_after_termination() {
        paused_rt().block_on(async {
            let session = Arc::new(StreamSession::new());
            let (tx, mut rx) = mpsc::unbounded_channel();

            let sampler = RateSampler::new(session.clone(), Duration::from_secs(1));
            let handle = tokio::spawn(sampler.run(Box::new(ChannelSink(tx))));

            tokio::time::sleep(Duration::from_millis(1100)).await;
            assert!(rx.recv().await.is_some());

            session.finish();
            handle.await.unwrap();

            // the sink is dropped with the sampler: the channel must be closed
            // without any trailing sample
            assert!(rx.recv().await.is_none());
        });
    }
}
