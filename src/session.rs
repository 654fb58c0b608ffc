//! Per-stream shared state.
//!
//! One [`StreamSession`] exists per open stream and is shared by three
//! execution contexts: the driving context mutates the counters, the timer
//! context reads them, and whichever context observes termination first wins
//! the single-fire latch. Nothing here is ever shared across streams.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use rustc_hash::FxHashSet;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::credit::CreditWindow;
use crate::error::StreamError;

/// Single-fire completion signal. Any context may try to fire it; exactly one
/// succeeds, and every waiter wakes up. Completion and error race in the
/// transport's delivery model, so this latch is what makes the terminal path
/// exactly-once.
pub struct TerminalLatch {
    fired: AtomicBool,
    notify: Notify,
}

impl TerminalLatch {
    fn new() -> TerminalLatch {
        TerminalLatch {
            fired: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Returns true for the one caller that actually fired the latch.
    pub fn fire(&self) -> bool {
        let won = self.fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        loop {
            if self.is_fired() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

/// Final counter values of a closed stream.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Totals {
    pub messages: u64,
    pub bytes: u64,
    pub last_payload_bytes: u64,
}

pub struct StreamSession {
    started: Instant,
    bytes_transferred: AtomicU64,
    messages_transferred: AtomicU64,
    last_payload_bytes: AtomicU64,
    error: OnceLock<StreamError>,
    terminal: TerminalLatch,
}

impl StreamSession {
    pub fn new() -> StreamSession {
        StreamSession {
            started: Instant::now(),
            bytes_transferred: AtomicU64::new(0),
            messages_transferred: AtomicU64::new(0),
            last_payload_bytes: AtomicU64::new(0),
            error: OnceLock::new(),
            terminal: TerminalLatch::new(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Accounts one transferred message. The message counter is bumped before
    /// the byte counter so a concurrent reader can never observe bytes whose
    /// message has not been counted yet.
    pub fn record_transfer(&self, payload_bytes: u64) {
        self.messages_transferred.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred.fetch_add(payload_bytes, Ordering::Relaxed);
        self.last_payload_bytes.store(payload_bytes, Ordering::Relaxed);
    }

    pub fn counters(&self) -> (u64, u64) {
        (
            self.bytes_transferred.load(Ordering::Relaxed),
            self.messages_transferred.load(Ordering::Relaxed),
        )
    }

    pub fn totals(&self) -> Totals {
        Totals {
            messages: self.messages_transferred.load(Ordering::Relaxed),
            bytes: self.bytes_transferred.load(Ordering::Relaxed),
            last_payload_bytes: self.last_payload_bytes.load(Ordering::Relaxed),
        }
    }

    /// Captures the first error. Later errors are dropped, as is anything
    /// arriving after the stream already terminated - a half-close failing
    /// because the peer completed a moment earlier must not turn a finished
    /// run into a failed one.
    pub fn record_error(&self, error: StreamError) -> bool {
        if self.terminal.is_fired() {
            debug!("ignoring error after stream termination: {}", error);
            return false;
        }
        match self.error.set(error) {
            Ok(()) => true,
            Err(dropped) => {
                debug!("ignoring subsequent error, first error wins: {}", dropped);
                false
            }
        }
    }

    pub fn error(&self) -> Option<&StreamError> {
        self.error.get()
    }

    pub fn terminal(&self) -> &TerminalLatch {
        &self.terminal
    }

    pub fn finish(&self) -> bool {
        self.terminal.fire()
    }

    pub async fn wait_terminal(&self) {
        self.terminal.wait().await
    }
}

/// Error path shared by every context that can observe a failure: capture the
/// error, drain the credit window so nobody stays parked, fire the latch.
pub fn fail_stream(session: &StreamSession, window: &CreditWindow, error: StreamError) {
    session.record_error(error);
    window.close();
    session.finish();
}

/// Graceful termination: drain the window (a defensively closed window is
/// harmless once the stream is done) and fire the latch.
pub fn complete_stream(session: &StreamSession, window: &CreditWindow) {
    window.close();
    session.finish();
}

/// The set of sequence numbers sent but not yet acknowledged. Every
/// acknowledgement must settle exactly one registered sequence; anything else
/// means the peer or the transport is corrupt.
#[derive(Default)]
pub struct InFlightSet {
    sequences: Mutex<FxHashSet<u64>>,
}

impl InFlightSet {
    pub fn register(&self, sequence: u64) {
        let inserted = self.sequences
            .lock().expect("in-flight set lock poisoned")
            .insert(sequence);
        debug_assert!(inserted, "sequence {} registered twice", sequence);
    }

    /// True if the sequence was in flight; it no longer is afterwards.
    pub fn settle(&self, sequence: u64) -> bool {
        self.sequences
            .lock().expect("in-flight set lock poisoned")
            .remove(&sequence)
    }

    pub fn len(&self) -> usize {
        self.sequences.lock().expect("in-flight set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
