//! A reference orchestration loop for the "get model" phase.
//!
//! The round state machine never waits on its own; this driver is where the waiting
//! between "not ready" replies happens.

use std::{num::NonZeroUsize, time::Duration};

use log::{debug, info, warn};
use serde::Deserialize;

use crate::{
    Result, RoundOutcome,
    metrics::RoundMetrics,
    registry::SessionBackend,
    round::GetModelRound,
    transport::Transport,
};

const DEFAULT_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_WAITS: NonZeroUsize = NonZeroUsize::MIN.saturating_add(9);

/// How long and how often to wait on a server that is not ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    interval_ms: u64,
    max_waits: NonZeroUsize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            max_waits: DEFAULT_MAX_WAITS,
        }
    }
}

impl RetryPolicy {
    /// Creates a new `RetryPolicy`.
    ///
    /// # Args
    /// * `interval` - Pause between two attempts after a "not ready" reply.
    /// * `max_waits` - How many "not ready" replies are waited out before giving up.
    pub fn new(interval: Duration, max_waits: NonZeroUsize) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            max_waits,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_waits(&self) -> usize {
        self.max_waits.get()
    }
}

/// Runs "get model" attempts over a transport until the reply is something other than
/// "not ready", or the retry policy is exhausted.
pub struct RoundDriver<'a, B: SessionBackend, T> {
    round: GetModelRound<'a, B>,
    transport: T,
    retry: RetryPolicy,
    metrics: RoundMetrics,
}

impl<'a, B, T> RoundDriver<'a, B, T>
where
    B: SessionBackend,
    T: Transport,
{
    pub fn new(round: GetModelRound<'a, B>, transport: T, retry: RetryPolicy) -> Self {
        Self {
            round,
            transport,
            retry,
            metrics: RoundMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &RoundMetrics {
        &self.metrics
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Fetches the global model for `iteration` and merges it.
    ///
    /// # Returns
    /// * `Applied` once the model has been merged.
    /// * `RestartRound` as soon as the server reports the round expired.
    /// * `WaitAndRetry` if the server was still not ready after `max_waits` waits.
    /// * `Failed` for any other reply.
    ///
    /// # Errors
    /// Only transport failures, every protocol level failure is a `Failed` outcome.
    pub async fn fetch_model(&mut self, iteration: i32) -> Result<RoundOutcome> {
        let mut waits = 0;

        loop {
            self.metrics.bump_attempt();

            let request = self.round.request(iteration)?;
            debug!(iteration = iteration, bytes = request.len(); "sending get model request");
            let reply = self.transport.exchange(&request).await?;

            match self.round.on_response(&reply) {
                RoundOutcome::WaitAndRetry if waits < self.retry.max_waits() => {
                    waits += 1;
                    let interval = self.retry.interval();
                    info!(
                        iteration = iteration,
                        wait = waits;
                        "server not ready, asking again in {interval:?}"
                    );

                    tokio::time::sleep(interval).await;
                    self.metrics.add_wait(interval);
                }
                outcome => {
                    match &outcome {
                        RoundOutcome::Applied(report) => {
                            info!(iteration = iteration; "global model applied: {report:?}")
                        }
                        RoundOutcome::WaitAndRetry => {
                            warn!(
                                iteration = iteration;
                                "server still not ready after {waits} waits"
                            )
                        }
                        RoundOutcome::RestartRound => {
                            info!(iteration = iteration; "round expired, restart required")
                        }
                        RoundOutcome::Failed(e) => {
                            warn!(iteration = iteration; "get model failed: {e}")
                        }
                    }

                    self.metrics.record(&outcome);
                    return Ok(outcome);
                }
            }
        }
    }
}
