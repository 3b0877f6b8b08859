//! Model partitions and the sessions used to write weights into them.
//!
//! Every registered partition owns a lock. A session is only ever alive while that lock
//! is held, and it is freed before the lock is released, whichever way the holder exits.

mod memory;

use std::{
    collections::HashMap,
    error::Error,
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use parking_lot::{Mutex, MutexGuard};

use crate::{FlClientErr, Result, WeightBuffer};

pub use memory::{MemoryBackend, MemorySession};

/// Failure reported by a session backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionErr(String);

impl SessionErr {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for SessionErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for SessionErr {}

/// The inference/training engine boundary.
///
/// A session is opened on a model, receives weights and is freed. The registry guarantees
/// that at most one session per model target is alive at a time.
pub trait SessionBackend: Send + Sync {
    type Session: Send;

    /// Opens a session on the model stored at `model_path`.
    fn init_session(&self, model_path: &Path) -> std::result::Result<Self::Session, SessionErr>;

    /// Copies `weights` into the model behind `session`.
    ///
    /// The backend must not keep references to `weights` after returning.
    fn apply_weights(
        &self,
        session: &mut Self::Session,
        model_path: &Path,
        weights: &[&WeightBuffer],
    ) -> std::result::Result<(), SessionErr>;

    /// Releases every resource held by `session`.
    fn free_session(&self, session: Self::Session);
}

#[derive(Debug)]
struct Target {
    path: PathBuf,
    lock: Mutex<()>,
}

/// Maps partition names to the model each one is stored in.
pub struct ModelTargetRegistry<B: SessionBackend> {
    backend: B,
    targets: HashMap<String, Target>,
}

impl<B: SessionBackend> ModelTargetRegistry<B> {
    /// Creates a new `ModelTargetRegistry` without any target.
    ///
    /// # Args
    /// * `backend` - The engine sessions are opened on.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            targets: HashMap::new(),
        }
    }

    /// Registers (or replaces) the model path for `partition`.
    pub fn register(&mut self, partition: impl Into<String>, model_path: impl Into<PathBuf>) {
        let target = Target {
            path: model_path.into(),
            lock: Mutex::new(()),
        };

        self.targets.insert(partition.into(), target);
    }

    /// Same as `register`, in builder form.
    pub fn with_target(
        mut self,
        partition: impl Into<String>,
        model_path: impl Into<PathBuf>,
    ) -> Self {
        self.register(partition, model_path);
        self
    }

    pub fn contains(&self, partition: &str) -> bool {
        self.targets.contains_key(partition)
    }

    pub fn model_path(&self, partition: &str) -> Option<&Path> {
        self.targets.get(partition).map(|t| t.path.as_path())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Takes exclusive hold of `partition` and opens a session on its model.
    ///
    /// Blocks while another caller holds the same partition.
    ///
    /// # Returns
    /// A guard that frees the session and releases the partition when dropped.
    ///
    /// # Errors
    /// `ApplyFailed` if the partition is unknown or the session can't be opened.
    pub fn acquire(&self, partition: &str) -> Result<SessionGuard<'_, B>> {
        let Some((name, target)) = self.targets.get_key_value(partition) else {
            return Err(FlClientErr::ApplyFailed {
                partition: partition.to_string(),
                detail: "no model target registered".into(),
            });
        };

        let lock = target.lock.lock();
        let session = self
            .backend
            .init_session(&target.path)
            .map_err(|e| FlClientErr::ApplyFailed {
                partition: name.clone(),
                detail: format!("init session on {}: {e}", target.path.display()),
            })?;

        trace!(partition = name.as_str(); "session acquired");

        Ok(SessionGuard {
            partition: name,
            path: &target.path,
            backend: &self.backend,
            session: Some(session),
            _lock: lock,
        })
    }

    /// Acquires `partition`, applies `weights` to it and releases it.
    ///
    /// # Errors
    /// `ApplyFailed` if any of the three steps fails.
    pub fn apply(&self, partition: &str, weights: &[&WeightBuffer]) -> Result<()> {
        let mut guard = self.acquire(partition)?;
        guard.apply(weights)
    }
}

/// A live session on a partition's model, holding that partition exclusively.
pub struct SessionGuard<'r, B: SessionBackend> {
    partition: &'r str,
    path: &'r Path,
    backend: &'r B,
    session: Option<B::Session>,
    _lock: MutexGuard<'r, ()>,
}

impl<B: SessionBackend> SessionGuard<'_, B> {
    pub fn partition(&self) -> &str {
        self.partition
    }

    /// Copies `weights` into the partition's model.
    ///
    /// # Errors
    /// `ApplyFailed` if the backend refuses the weights.
    pub fn apply(&mut self, weights: &[&WeightBuffer]) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(FlClientErr::ApplyFailed {
                partition: self.partition.to_string(),
                detail: "session already released".into(),
            });
        };

        debug!(partition = self.partition, weights = weights.len(); "applying weights");

        self.backend
            .apply_weights(session, self.path, weights)
            .map_err(|e| FlClientErr::ApplyFailed {
                partition: self.partition.to_string(),
                detail: e.to_string(),
            })
    }
}

impl<B: SessionBackend> Drop for SessionGuard<'_, B> {
    fn drop(&mut self) {
        // Freed while the partition lock is still held, `_lock` is dropped after this.
        if let Some(session) = self.session.take() {
            self.backend.free_session(session);
            trace!(partition = self.partition; "session released");
        }
    }
}
