//! Builds the outbound "get model" request envelope.

use std::time::{SystemTime, UNIX_EPOCH};

use comms::{Deserialize, RequestGetModel};

use crate::{FlClientErr, Result};

/// A decoded "get model" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRequest {
    pub task_name: String,
    pub iteration: i32,
    pub timestamp_millis: i64,
}

impl RoundRequest {
    /// Decodes a request envelope produced by `build`.
    ///
    /// # Errors
    /// `MalformedResponse` if the bytes are not a request envelope or the timestamp is not
    /// a number.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let req = RequestGetModel::deserialize(raw)
            .map_err(|e| FlClientErr::MalformedResponse(e.to_string()))?;

        let timestamp_millis = req.timestamp.parse().map_err(|_| {
            FlClientErr::MalformedResponse(format!("invalid timestamp {:?}", req.timestamp))
        })?;

        Ok(Self {
            task_name: req.fl_name,
            iteration: req.iteration,
            timestamp_millis,
        })
    }
}

/// Builds a request envelope stamped with the current wall-clock time.
///
/// # Args
/// * `task_name` - The federated learning task, must be non-empty.
/// * `iteration` - The iteration of the task this request belongs to.
///
/// # Returns
/// The encoded envelope, ready for transport.
///
/// # Errors
/// `InvalidArgument` if `task_name` is empty.
pub fn build(task_name: &str, iteration: i32) -> Result<Vec<u8>> {
    build_at(task_name, iteration, now_millis())
}

/// Same as `build` but with an explicit timestamp.
pub fn build_at(task_name: &str, iteration: i32, timestamp_millis: i64) -> Result<Vec<u8>> {
    if task_name.is_empty() {
        return Err(FlClientErr::InvalidArgument("task name must not be empty"));
    }

    let req = RequestGetModel {
        fl_name: task_name.to_string(),
        iteration,
        timestamp: timestamp_millis.to_string(),
    };

    Ok(comms::to_vec(&req))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_decode_keeps_every_field() {
        let raw = build_at("lenet", 12, 1_700_000_000_123).unwrap();
        let req = RoundRequest::decode(&raw).unwrap();

        assert_eq!(
            req,
            RoundRequest {
                task_name: "lenet".into(),
                iteration: 12,
                timestamp_millis: 1_700_000_000_123,
            }
        );
    }

    #[test]
    fn build_stamps_wall_clock_time() {
        let before = now_millis();
        let raw = build("albert", 0).unwrap();
        let after = now_millis();

        let req = RoundRequest::decode(&raw).unwrap();
        assert!((before..=after).contains(&req.timestamp_millis));
    }

    #[test]
    fn empty_task_name_is_invalid() {
        assert!(matches!(
            build("", 1),
            Err(FlClientErr::InvalidArgument(_))
        ));
    }

    #[test]
    fn negative_iterations_survive() {
        let raw = build_at("t", -3, 0).unwrap();
        assert_eq!(RoundRequest::decode(&raw).unwrap().iteration, -3);
    }
}
