use std::{error::Error, fmt, io};

use crate::response::StatusCode;

/// The client's result type.
pub type Result<T> = std::result::Result<T, FlClientErr>;

/// Everything that can make a round attempt fail.
///
/// Waiting and restarting are not errors and never show up here, see `RoundOutcome`.
#[derive(Debug)]
pub enum FlClientErr {
    /// A caller supplied value is unusable (e.g. an empty task name).
    InvalidArgument(&'static str),
    /// The server's envelope could not be decoded or misses a required field.
    MalformedResponse(String),
    /// A successful response carried no weights at all.
    EmptyWeightSet,
    /// None of the returned weights is recognized by any partition.
    NoMatchingWeights { dropped: usize },
    /// Fewer weights than the configured ratio were recognized.
    PartialMatch {
        matched: usize,
        total: usize,
        required: f64,
    },
    /// A partition's session could not be acquired, applied to or released.
    ApplyFailed { partition: String, detail: String },
    /// The server answered with a failing status code.
    ServerRejected { status: StatusCode, reason: String },
    InvalidConfig(String),
    Json(serde_json::Error),
    Io(io::Error),
}

impl fmt::Display for FlClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            Self::MalformedResponse(detail) => write!(f, "malformed response: {detail}"),
            Self::EmptyWeightSet => f.write_str("successful response carried no weights"),
            Self::NoMatchingWeights { dropped } => write!(
                f,
                "none of the {dropped} returned weights matches a local partition"
            ),
            Self::PartialMatch {
                matched,
                total,
                required,
            } => write!(
                f,
                "only {matched} of {total} returned weights match a local partition, \
                 required ratio is {required}"
            ),
            Self::ApplyFailed { partition, detail } => {
                write!(f, "applying weights to partition {partition} failed: {detail}")
            }
            Self::ServerRejected { status, reason } => {
                write!(f, "server rejected the request with {status}: {reason}")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for FlClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FlClientErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for FlClientErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<FlClientErr> for io::Error {
    fn from(value: FlClientErr) -> Self {
        match value {
            FlClientErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
