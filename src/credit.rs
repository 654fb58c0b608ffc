//! Counting-credit flow control for in-flight frames.
//!
//! One credit is held per unacknowledged frame. The window is sized once per
//! stream from a byte budget, so peak unacknowledged memory stays bounded no
//! matter how big or small the configured payload is: small payloads pipeline
//! deeply (up to the credit cap), huge payloads degrade to one-in-flight.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::Semaphore;
use tracing::warn;

/// Returned by [`CreditWindow::acquire`] when the window has been closed;
/// the stream is terminal and the caller must stop sending.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct WindowClosed;

pub struct CreditWindow {
    capacity: u32,
    credits: Semaphore,
    outstanding: AtomicU32,
    peak_outstanding: AtomicU32,
}

impl CreditWindow {
    /// Window capacity for a given byte budget: `budget / payload`, floored
    /// to at least 1 and capped at `credit_cap`.
    pub fn capacity_for(budget_bytes: u64, payload_bytes: u64, credit_cap: u32) -> u32 {
        let per_budget = budget_bytes / payload_bytes.max(1);
        per_budget.clamp(1, credit_cap as u64) as u32
    }

    pub fn new(capacity: u32) -> CreditWindow {
        CreditWindow {
            capacity,
            credits: Semaphore::new(capacity as usize),
            outstanding: AtomicU32::new(0),
            peak_outstanding: AtomicU32::new(0),
        }
    }

    pub fn with_budget(budget_bytes: u64, payload_bytes: u64, credit_cap: u32) -> CreditWindow {
        Self::new(Self::capacity_for(budget_bytes, payload_bytes, credit_cap))
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Takes one credit, suspending the caller while the window is full.
    /// This is the stream's only backpressure mechanism.
    pub async fn acquire(&self) -> Result<(), WindowClosed> {
        match self.credits.acquire().await {
            Ok(permit) => {
                permit.forget();
                let now_outstanding = self.outstanding.fetch_add(1, Ordering::Relaxed) + 1;
                self.peak_outstanding.fetch_max(now_outstanding, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => Err(WindowClosed),
        }
    }

    /// Returns one credit. A release without a matching acquire is a protocol
    /// bug in the caller; it is clamped here so the window can never grow
    /// beyond its capacity, and the caller is expected to have escalated the
    /// underlying cause before it ever reaches this point.
    pub fn release(&self) {
        let had_outstanding = self.outstanding
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1))
            .is_ok();

        if had_outstanding {
            self.credits.add_permits(1);
        } else {
            warn!("credit released without a matching acquire - ignoring");
        }
    }

    /// Closes the window: every suspended `acquire` wakes up immediately with
    /// [`WindowClosed`], and all future acquires fail. Used on stream
    /// termination so no context stays parked waiting for credit that will
    /// never come. Outstanding credits are left as they are - the window is
    /// discarded with the stream.
    pub fn close(&self) {
        self.credits.close();
    }

    pub fn outstanding(&self) -> u32 {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// High-water mark of simultaneously outstanding credits.
    pub fn peak_outstanding(&self) -> u32 {
        self.peak_outstanding.load(Ordering::Relaxed)
    }
}
