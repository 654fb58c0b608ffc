use std::time::Duration;

use anyhow::bail;

use crate::protocol::MAX_PAYLOAD_BYTES;

/// Knobs of a benchmark run. The defaults mirror common streaming-RPC
/// settings: a 32 MiB flow-control budget and per-second reporting.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Byte budget for unacknowledged in-flight data. The credit window is
    /// sized as `window_budget_bytes / payload_size`, so peak unacknowledged
    /// memory stays bounded regardless of the configured message size.
    pub window_budget_bytes: u64,

    /// Upper bound on window capacity, so tiny payloads do not turn into
    /// thousands of in-flight frames.
    pub credit_cap: u32,

    /// Reporting period of the rate sampler.
    pub sample_interval: Duration,

    /// Upper bound on the wait for a run to reach its terminal state.
    /// Exceeding it is a hung-stream failure, not a silent success.
    pub run_timeout: Duration,

    /// Largest payload a receiver accepts; bigger length prefixes are treated
    /// as stream corruption.
    pub max_payload_bytes: usize,
}

impl Default for BenchConfig {
    fn default() -> BenchConfig {
        BenchConfig {
            window_budget_bytes: 32 * 1024 * 1024,
            credit_cap: 32,
            sample_interval: Duration::from_secs(1),
            run_timeout: Duration::from_secs(120),
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_budget_bytes == 0 {
            bail!("window budget must not be zero");
        }
        if self.credit_cap == 0 {
            bail!("credit cap must not be zero");
        }
        if self.sample_interval.is_zero() {
            bail!("sample interval must not be zero");
        }
        if self.max_payload_bytes > MAX_PAYLOAD_BYTES {
            bail!("payload limit must not exceed {} bytes", MAX_PAYLOAD_BYTES);
        }
        Ok(())
    }

    /// Payload size for a requested size in KiB, clamped to the configured
    /// limit.
    pub fn clamped_payload_bytes(&self, size_kb: u64) -> usize {
        size_kb
            .saturating_mul(1024)
            .min(self.max_payload_bytes as u64) as usize
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_default_config_is_valid() {
        assert!(BenchConfig::default().validate().is_ok());
    }

    #[rstest]
    #[case::zero_budget(BenchConfig { window_budget_bytes: 0, ..BenchConfig::default() })]
    #[case::zero_cap(BenchConfig { credit_cap: 0, ..BenchConfig::default() })]
    #[case::zero_interval(BenchConfig { sample_interval: Duration::ZERO, ..BenchConfig::default() })]
    fn test_invalid_configs_are_rejected(#[case] config: BenchConfig) {
        assert!(config.validate().is_err());
    }

    #[rstest]
    #[case::regular(64, 64 * 1024)]
    #[case::zero(0, 0)]
    #[case::clamped(u64::MAX, MAX_PAYLOAD_BYTES)]
    fn test_clamped_payload_bytes(#[case] size_kb: u64, #[case] expected: usize) {
        assert_eq!(BenchConfig::default().clamped_payload_bytes(size_kb), expected);
    }
}
