//! Retry delay ladder.

use std::{sync::Arc, time::Duration};

use rally_config::BackoffConfig;

/// Delays used after consecutive failures: 1s, 2s, 5s, then 10s forever.
pub const DEFAULT_LADDER: [Duration; 4] = [
    Duration::from_millis(1_000),
    Duration::from_millis(2_000),
    Duration::from_millis(5_000),
    Duration::from_millis(10_000),
];

/// Maps an attempt index to a retry delay.
///
/// `delay_for(i) = ladder[min(i, ladder.len() - 1)]`. No jitter, and the
/// scheduler itself keeps no state: the controller owns the attempt index.
#[derive(Debug, Clone)]
pub struct BackoffScheduler {
    ladder: Arc<[Duration]>,
}

impl Default for BackoffScheduler {
    fn default() -> Self {
        Self {
            ladder: Arc::from(DEFAULT_LADDER.as_slice()),
        }
    }
}

impl BackoffScheduler {
    /// Build a scheduler from an explicit ladder. An empty ladder falls back
    /// to [`DEFAULT_LADDER`].
    #[must_use]
    pub fn new(ladder: Vec<Duration>) -> Self {
        if ladder.is_empty() {
            return Self::default();
        }
        Self {
            ladder: Arc::from(ladder),
        }
    }

    #[must_use]
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            config
                .ladder_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
        )
    }

    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let last = self.ladder.len() - 1;
        let idx = usize::try_from(attempt).map_or(last, |a| a.min(last));
        self.ladder[idx]
    }

    #[must_use]
    pub fn ladder(&self) -> &[Duration] {
        &self.ladder
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(0, 1_000)]
    #[case(1, 2_000)]
    #[case(2, 5_000)]
    #[case(3, 10_000)]
    #[case(4, 10_000)]
    #[case(u32::MAX, 10_000)]
    fn default_ladder(#[case] attempt: u32, #[case] expected_ms: u64) {
        let scheduler = BackoffScheduler::default();
        assert_eq!(
            scheduler.delay_for(attempt),
            Duration::from_millis(expected_ms)
        );
    }

    #[test]
    fn empty_ladder_falls_back_to_default() {
        let scheduler = BackoffScheduler::new(Vec::new());
        assert_eq!(scheduler.ladder(), DEFAULT_LADDER.as_slice());
    }

    #[test]
    fn ladder_from_config() {
        let scheduler = BackoffScheduler::from_config(&BackoffConfig {
            ladder_ms: vec![250, 750],
        });
        assert_eq!(scheduler.delay_for(0), Duration::from_millis(250));
        assert_eq!(scheduler.delay_for(7), Duration::from_millis(750));
    }
}
