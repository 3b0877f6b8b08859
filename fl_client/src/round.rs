//! The "get model" round state machine.

use log::{info, warn};

use crate::{
    FlClientErr, ModeSelector, Result, WeightPartitionPlan,
    merge::{self, MergeReport},
    registry::{ModelTargetRegistry, SessionBackend},
    request,
    response::{self, RoundResponse, StatusCode},
};

/// What a response's status asks the client to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    ProceedToMerge,
    Wait,
    Restart,
    Failed,
}

/// Classifies a response purely by its status code.
pub fn classify(status: StatusCode) -> Classification {
    match status {
        StatusCode::Success => Classification::ProceedToMerge,
        StatusCode::NotReady => Classification::Wait,
        StatusCode::Expired => Classification::Restart,
        StatusCode::RequestError | StatusCode::SystemError | StatusCode::Unknown(_) => {
            Classification::Failed
        }
    }
}

/// The result of one round attempt, handed back to the orchestration loop.
#[derive(Debug)]
pub enum RoundOutcome {
    /// Every targeted partition was updated.
    Applied(MergeReport),
    /// The server is not ready yet, ask again later.
    WaitAndRetry,
    /// The round window expired, re-enter the protocol from its first phase.
    RestartRound,
    Failed(FlClientErr),
}

impl RoundOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Drives a single participant through the "get model" phase of a round.
///
/// Each call is one step: it never loops, sleeps or performs I/O itself.
pub struct GetModelRound<'a, B: SessionBackend> {
    task_name: &'a str,
    plan: WeightPartitionPlan,
    registry: &'a ModelTargetRegistry<B>,
}

impl<'a, B: SessionBackend> GetModelRound<'a, B> {
    /// Creates a new `GetModelRound`.
    ///
    /// # Args
    /// * `selector` - The process wide training mode.
    /// * `registry` - The model partitions weights are merged into.
    ///
    /// # Errors
    /// `InvalidConfig` if a partition of the selected plan has no registered target.
    pub fn new(selector: &'a ModeSelector, registry: &'a ModelTargetRegistry<B>) -> Result<Self> {
        let plan = selector.plan();

        if let Some(missing) = plan.partition_names().find(|name| !registry.contains(name)) {
            return Err(FlClientErr::InvalidConfig(format!(
                "partition {missing} has no model target"
            )));
        }

        Ok(Self {
            task_name: selector.task_name(),
            plan,
            registry,
        })
    }

    pub fn plan(&self) -> &WeightPartitionPlan {
        &self.plan
    }

    /// Builds the request envelope for `iteration`.
    pub fn request(&self, iteration: i32) -> Result<Vec<u8>> {
        request::build(self.task_name, iteration)
    }

    /// Turns a raw server reply into the outcome of this attempt.
    pub fn on_response(&self, raw: &[u8]) -> RoundOutcome {
        match response::parse(raw) {
            Ok(resp) => self.on_parsed(resp),
            Err(e) => RoundOutcome::Failed(e),
        }
    }

    /// Same as `on_response`, for an already decoded reply.
    pub fn on_parsed(&self, resp: RoundResponse) -> RoundOutcome {
        info!(
            iteration = resp.iteration,
            weights = resp.weights.len();
            "get model response: status={} reason={:?}",
            resp.status,
            resp.reason
        );

        match classify(resp.status) {
            Classification::ProceedToMerge => {
                match merge::merge(&resp.weights, &self.plan, self.registry) {
                    Ok(report) => RoundOutcome::Applied(report),
                    Err(e) => {
                        warn!("merging the global model failed: {e}");
                        RoundOutcome::Failed(e)
                    }
                }
            }
            Classification::Wait => RoundOutcome::WaitAndRetry,
            Classification::Restart => RoundOutcome::RestartRound,
            Classification::Failed => RoundOutcome::Failed(FlClientErr::ServerRejected {
                status: resp.status,
                reason: resp.reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table() {
        assert_eq!(classify(StatusCode::Success), Classification::ProceedToMerge);
        assert_eq!(classify(StatusCode::NotReady), Classification::Wait);
        assert_eq!(classify(StatusCode::Expired), Classification::Restart);
        assert_eq!(classify(StatusCode::RequestError), Classification::Failed);
        assert_eq!(classify(StatusCode::SystemError), Classification::Failed);
        assert_eq!(classify(StatusCode::Unknown(0)), Classification::Failed);
    }

    #[test]
    fn every_unlisted_wire_value_fails() {
        for code in (-10..1000).filter(|c| ![200, 201, 300].contains(c)) {
            assert_eq!(classify(StatusCode::from(code)), Classification::Failed, "{code}");
        }
    }
}
