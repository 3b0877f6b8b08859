//! Client side of the "get model" phase of a federated learning round.
//!
//! A participant asks the coordinating server for the aggregated global model of an
//! iteration, decides from the reply whether to merge, wait, restart or fail, and
//! writes the received weights into its local model partitions.

pub mod callbacks;
pub mod config;
pub mod driver;
pub mod error;
pub mod merge;
pub mod metrics;
pub mod mode;
pub mod registry;
pub mod request;
pub mod response;
pub mod round;
pub mod transport;
pub mod weights;

pub use config::ClientConfig;
pub use driver::{RetryPolicy, RoundDriver};
pub use error::{FlClientErr, Result};
pub use merge::{MergeReport, merge};
pub use mode::{MatchPolicy, ModeSelector, TrainingMode, WeightPartitionPlan};
pub use registry::{ModelTargetRegistry, SessionBackend};
pub use response::StatusCode;
pub use round::{Classification, GetModelRound, RoundOutcome, classify};
pub use transport::{Framed, Transport};
pub use weights::WeightBuffer;
