use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use log::trace;
use parking_lot::RwLock;

use super::{SessionBackend, SessionErr};
use crate::WeightBuffer;

const F32_SIZE: usize = size_of::<f32>();

/// Named `f32` tensors making up one model.
type Tensors = HashMap<String, Vec<f32>>;

/// An in-process engine keeping every model as a set of named `f32` tensors.
///
/// Models must be declared up front with their tensor names and lengths; applying a
/// weight the model doesn't declare, or with the wrong size, fails the whole apply call
/// without touching the model.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    models: RwLock<HashMap<PathBuf, Tensors>>,
}

/// A session over one model held by a `MemoryBackend`.
#[derive(Debug)]
pub struct MemorySession {
    path: PathBuf,
    applied: usize,
}

impl MemorySession {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of weights written through this session so far.
    pub fn applied(&self) -> usize {
        self.applied
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a model stored at `path` with zero initialized tensors.
    ///
    /// # Args
    /// * `path` - Where the model lives.
    /// * `layout` - Tensor names and their lengths, in elements.
    pub fn with_model<I, S>(self, path: impl Into<PathBuf>, layout: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let tensors = layout
            .into_iter()
            .map(|(name, len)| (name.into(), vec![0.0; len]))
            .collect();

        self.models.write().insert(path.into(), tensors);
        self
    }

    /// Returns a copy of a tensor's current values.
    pub fn tensor(&self, path: impl AsRef<Path>, name: &str) -> Option<Vec<f32>> {
        self.models.read().get(path.as_ref())?.get(name).cloned()
    }
}

impl SessionBackend for MemoryBackend {
    type Session = MemorySession;

    fn init_session(&self, model_path: &Path) -> Result<MemorySession, SessionErr> {
        if !self.models.read().contains_key(model_path) {
            return Err(SessionErr::new(format!(
                "no model loaded at {}",
                model_path.display()
            )));
        }

        Ok(MemorySession {
            path: model_path.to_path_buf(),
            applied: 0,
        })
    }

    fn apply_weights(
        &self,
        session: &mut MemorySession,
        model_path: &Path,
        weights: &[&WeightBuffer],
    ) -> Result<(), SessionErr> {
        if session.path != model_path {
            return Err(SessionErr::new(format!(
                "session opened on {} used for {}",
                session.path.display(),
                model_path.display()
            )));
        }

        let mut models = self.models.write();
        let Some(tensors) = models.get_mut(model_path) else {
            return Err(SessionErr::new(format!(
                "model at {} was unloaded",
                model_path.display()
            )));
        };

        for w in weights {
            let Some(tensor) = tensors.get(w.name()) else {
                return Err(SessionErr::new(format!("unknown tensor {}", w.name())));
            };

            let expected = tensor.len() * F32_SIZE;
            if w.byte_len() != expected {
                return Err(SessionErr::new(format!(
                    "tensor {} expects {expected} bytes, got {}",
                    w.name(),
                    w.byte_len()
                )));
            }
        }

        for w in weights {
            if let Some(tensor) = tensors.get_mut(w.name()) {
                let values = w
                    .data()
                    .chunks_exact(F32_SIZE)
                    .map(bytemuck::pod_read_unaligned::<f32>);

                tensor.iter_mut().zip(values).for_each(|(dst, v)| *dst = v);
                trace!(tensor = w.name(), len = tensor.len(); "tensor updated");
            }
        }

        session.applied += weights.len();
        Ok(())
    }

    fn free_session(&self, session: MemorySession) {
        trace!(applied = session.applied; "memory session freed");
    }
}
