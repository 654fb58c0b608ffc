//! The outbound drive loop of a client stream.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::credit::CreditWindow;
use crate::protocol::Frame;
use crate::session::{fail_stream, InFlightSet, StreamSession};
use crate::transport::FrameSink;

/// Emits the configured number of frames with gapless, strictly increasing
/// sequence numbers, holding one window credit per frame in flight. This is
/// the only writer to the outbound stream.
pub struct StreamingSender {
    session: Arc<StreamSession>,
    window: Arc<CreditWindow>,
    in_flight: Arc<InFlightSet>,
}

impl StreamingSender {
    pub fn new(
        session: Arc<StreamSession>,
        window: Arc<CreditWindow>,
        in_flight: Arc<InFlightSet>,
    ) -> StreamingSender {
        StreamingSender { session, window, in_flight }
    }

    /// Runs the send loop to completion. Failures are not returned - they are
    /// recorded in the session, where every other context observes them.
    pub async fn run(self, mut sink: Box<dyn FrameSink>, num_messages: u64, payload: Bytes) {
        for sequence in 0..num_messages {
            if self.window.acquire().await.is_err() {
                // the window only closes on stream termination; whoever
                // closed it has already handled the terminal path
                debug!("send loop stopping after {} frames: window closed", sequence);
                return;
            }

            if self.session.error().is_some() {
                // terminal error observed between acquire and send: hand the
                // credit back instead of leaking window capacity
                self.window.release();
                debug!("send loop aborting before frame {}", sequence);
                return;
            }

            self.in_flight.register(sequence);
            trace!("sending frame {}", sequence);

            if let Err(e) = sink.send(Frame { sequence, payload: payload.clone() }).await {
                fail_stream(&self.session, &self.window, e);
                return;
            }
        }

        if let Err(e) = sink.half_close().await {
            fail_stream(&self.session, &self.window, e);
            return;
        }
        debug!("send loop finished: {} frames, half-closed", num_messages);
    }
}
