//! The inbound loop of a client stream: acknowledgements in, credits out.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::credit::CreditWindow;
use crate::error::StreamError;
use crate::protocol::Ack;
use crate::session::{complete_stream, fail_stream, InFlightSet, StreamSession};
use crate::transport::AckSource;

/// Consumes acknowledgements until the peer completes or fails, updating the
/// shared counters and releasing one window credit per settled frame.
///
/// Every acknowledgement must match exactly one in-flight sequence - an
/// unknown or repeated sequence means the peer or the transport is corrupt,
/// which aborts the stream rather than being silently ignored.
pub struct AckCollector {
    session: Arc<StreamSession>,
    window: Arc<CreditWindow>,
    in_flight: Arc<InFlightSet>,
    payload_bytes: u64,
}

impl AckCollector {
    pub fn new(
        session: Arc<StreamSession>,
        window: Arc<CreditWindow>,
        in_flight: Arc<InFlightSet>,
        payload_bytes: u64,
    ) -> AckCollector {
        AckCollector { session, window, in_flight, payload_bytes }
    }

    /// Runs until the stream is terminal. The terminal path (latch, window
    /// drain, error slot) fires exactly once no matter how completion and
    /// error race on the wire.
    pub async fn run(self, mut acks: Box<dyn AckSource>) {
        loop {
            match acks.recv().await {
                Ok(Some(ack)) => {
                    if let Err(e) = self.on_ack(ack) {
                        fail_stream(&self.session, &self.window, e);
                        return;
                    }
                }
                Ok(None) => {
                    debug!("acknowledgement stream completed");
                    complete_stream(&self.session, &self.window);
                    return;
                }
                Err(e) => {
                    fail_stream(&self.session, &self.window, e);
                    return;
                }
            }
        }
    }

    fn on_ack(&self, ack: Ack) -> Result<(), StreamError> {
        trace!("received ack {}", ack.sequence);

        if !ack.ok {
            return Err(StreamError::transport(format!("peer rejected frame {}", ack.sequence)));
        }
        if !self.in_flight.settle(ack.sequence) {
            return Err(StreamError::protocol(format!(
                "acknowledgement {} does not match any frame in flight", ack.sequence,
            )));
        }

        self.session.record_transfer(self.payload_bytes);
        self.window.release();
        Ok(())
    }
}
