//! A throughput benchmark for client-to-server streaming with per-message
//! acknowledgement, comparing interchangeable transport bindings under
//! identical load.
//!
//! ## Protocol
//!
//! The client opens one stream and sends a configured number of payload
//! frames with gapless, strictly increasing sequence numbers. The server
//! acknowledges every frame it receives, in receipt order; acknowledgement
//! arrival order at the client is *not* guaranteed to match send order, only
//! the 1:1 correspondence by sequence number is. After the last frame the
//! client half-closes; the server drains, acknowledges the tail and
//! completes, which the client observes as a clean end of the
//! acknowledgement stream.
//!
//! ```ascii
//!  sender ----frames----> transport ----frames----> serving loop
//!     ^                                                  |
//!     | credits                                          | acks (sync)
//!     |                                                  v
//!  credit window <--- collector <---- transport <--------+
//! ```
//!
//! ## Flow control
//!
//! In-flight data is bounded by a counting-credit window sized from a byte
//! budget (32 MiB by default): one credit per unacknowledged frame, capacity
//! `max(1, min(32, budget / payload_size))`. The sender suspends on credit
//! acquisition - that is the only backpressure mechanism, and it bounds peak
//! unacknowledged memory independently of the configured message size.
//!
//! ## Termination
//!
//! Completion and error race in the transport's delivery model, so every
//! stream carries a single-fire terminal latch. Whichever context observes
//! the end first - collector completion, collector error, sender failure, or
//! the run-level timeout - fires it exactly once; the first error wins a
//! single-assignment error slot, the credit window is drained so no context
//! stays parked, and the summary is emitted at most once per stream.
//!
//! ## Wire format
//!
//! Both bindings share one length-delimited codec; see [`protocol`] for the
//! message layout and [`transport`] for the binding seam.

pub mod client;
pub mod collector;
pub mod config;
pub mod credit;
pub mod error;
mod framing;
pub mod protocol;
pub mod report;
pub mod sampler;
pub mod sender;
pub mod server;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
