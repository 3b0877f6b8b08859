//! Decodes the server's "get model" reply.

use std::fmt;

use comms::{Deserialize, ResponseCode, ResponseGetModel};

use crate::{FlClientErr, Result, WeightBuffer};

/// The status a response carries, as far as this client is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    NotReady,
    Expired,
    RequestError,
    SystemError,
    /// Any other wire value, kept for diagnostics.
    Unknown(i32),
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        match ResponseCode::from_code(code) {
            Some(ResponseCode::Succeed) => Self::Success,
            Some(ResponseCode::SucNotReady) => Self::NotReady,
            Some(ResponseCode::OutOfTime) => Self::Expired,
            Some(ResponseCode::RequestError) => Self::RequestError,
            Some(ResponseCode::SystemError) => Self::SystemError,
            _ => Self::Unknown(code),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("SUCCESS"),
            Self::NotReady => f.write_str("NOT_READY"),
            Self::Expired => f.write_str("EXPIRED"),
            Self::RequestError => f.write_str("REQUEST_ERROR"),
            Self::SystemError => f.write_str("SYSTEM_ERROR"),
            Self::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// A decoded server reply.
///
/// `weights` only means something when `status` is `Success`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResponse {
    pub status: StatusCode,
    pub reason: String,
    pub iteration: i32,
    pub timestamp_millis: i64,
    pub weights: Vec<WeightBuffer>,
}

/// Decodes a response envelope.
///
/// Status semantics are not interpreted here, see `round::classify`.
///
/// # Errors
/// `MalformedResponse` if the envelope can't be decoded, `retcode` is absent or a weight
/// has an empty name. The timestamp is informational: an empty or unreadable one reads
/// as `0`.
pub fn parse(raw: &[u8]) -> Result<RoundResponse> {
    let resp = ResponseGetModel::deserialize(raw)
        .map_err(|e| FlClientErr::MalformedResponse(e.to_string()))?;

    let Some(retcode) = resp.retcode else {
        return Err(FlClientErr::MalformedResponse("missing retcode".into()));
    };

    let timestamp_millis: i64 = resp.timestamp.parse().unwrap_or_default();

    let weights = resp
        .feature_map
        .into_iter()
        .enumerate()
        .map(|(i, fm)| {
            WeightBuffer::try_from(fm).map_err(|_| {
                FlClientErr::MalformedResponse(format!("weight {i} has an empty name"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RoundResponse {
        status: StatusCode::from(retcode),
        reason: resp.reason,
        iteration: resp.iteration,
        timestamp_millis,
        weights,
    })
}
