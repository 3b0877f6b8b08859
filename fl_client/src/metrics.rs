use std::time::Duration;

use crate::RoundOutcome;

/// Counters kept by the `RoundDriver` across every fetch it runs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoundMetrics {
    pub attempts: u64,
    pub waits: u64,
    pub wait_time: Duration,
    pub restarts: u64,
    pub failures: u64,
    pub applied_buffers: u64,
    pub dropped_buffers: u64,
}

impl RoundMetrics {
    #[inline]
    pub fn bump_attempt(&mut self) {
        self.attempts += 1;
    }

    #[inline]
    pub fn add_wait(&mut self, waited: Duration) {
        self.waits += 1;
        self.wait_time += waited;
    }

    /// Accounts for the final outcome of a fetch.
    pub fn record(&mut self, outcome: &RoundOutcome) {
        match outcome {
            RoundOutcome::Applied(report) => {
                self.applied_buffers += report.applied_buffers() as u64;
                self.dropped_buffers += report.dropped as u64;
            }
            RoundOutcome::WaitAndRetry => {}
            RoundOutcome::RestartRound => self.restarts += 1,
            RoundOutcome::Failed(_) => self.failures += 1,
        }
    }
}
