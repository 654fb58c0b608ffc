//! Console output for per-second ticks and the end-of-run summary.
//!
//! This is the benchmark's product output, so it goes to stdout directly;
//! diagnostics go through `tracing` like everywhere else. The exact text
//! layout is not a protocol contract.

use std::time::{Duration, Instant};

use crate::sampler::{Sample, SampleSink};
use crate::session::Totals;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;
const HEADER_EVERY: Duration = Duration::from_secs(10);

/// Prints one line per sample, re-printing the column header every ten
/// seconds so it stays visible in long runs.
pub struct ConsoleReporter {
    side: &'static str,
    impl_name: &'static str,
    last_header: Option<Instant>,
}

impl ConsoleReporter {
    pub fn new(side: &'static str, impl_name: &'static str) -> ConsoleReporter {
        ConsoleReporter {
            side,
            impl_name,
            last_header: None,
        }
    }

    fn header_if_due(&mut self) {
        let due = match self.last_header {
            None => true,
            Some(at) => at.elapsed() >= HEADER_EVERY,
        };
        if due {
            println!("  side  impl     t(+s) |   MB/s");
            println!("--------------------------------");
            self.last_header = Some(Instant::now());
        }
    }
}

impl SampleSink for ConsoleReporter {
    fn on_sample(&mut self, sample: &Sample) {
        self.header_if_due();
        println!(
            " {:>6} {:<7} {:>7} | {:>7.2}   ({} msgs, {:.2} MB)",
            self.side, self.impl_name, sample.elapsed_secs, sample.mbps,
            sample.delta_messages, sample.delta_mib,
        );
    }
}

/// Aggregate throughput over a whole run; zero when no time passed, never
/// NaN or infinite.
pub fn aggregate_mbps(total_bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        (total_bytes as f64 / BYTES_PER_MIB) / seconds
    } else {
        0.0
    }
}

/// The boxed end-of-run summary, printed exactly once per stream.
pub fn summary(side: &str, impl_name: &str, totals: &Totals, elapsed: Duration) {
    let line = "══════════════════════════════════════════════════════════════";
    println!("{}", line);
    println!(" SUMMARY  {} / {}", side, impl_name);
    println!("   messages     : {}", totals.messages);
    println!("   message size : {} bytes", totals.last_payload_bytes);
    println!("   total bytes  : {}", totals.bytes);
    println!("   total time   : {:.3} s", elapsed.as_secs_f64());
    println!("   throughput   : {:.2} MB/s", aggregate_mbps(totals.bytes, elapsed));
    println!("{}", line);
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::normal(100 * 1024 * 1024, Duration::from_secs(2), 50.0)]
    #[case::zero_bytes(0, Duration::from_secs(5), 0.0)]
    #[case::zero_elapsed(1024, Duration::ZERO, 0.0)]
    fn test_aggregate_mbps(#[case] bytes: u64, #[case] elapsed: Duration, #[case] expected: f64) {
        let actual = aggregate_mbps(bytes, elapsed);
        assert!((actual - expected).abs() < 1e-9, "expected {}, got {}", expected, actual);
        assert!(actual.is_finite());
        assert!(actual >= 0.0);
    }
}
