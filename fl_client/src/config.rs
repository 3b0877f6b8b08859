use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    FlClientErr, MatchPolicy, ModeSelector, Result, TrainingMode,
    driver::RetryPolicy,
    registry::{MemoryBackend, ModelTargetRegistry, SessionBackend},
};

/// Client configuration as read from JSON.
///
/// ```json
/// {
///   "task_name": "albert",
///   "mode": { "kind": "hybrid", "shared_weights": ["..."], "task_weights": ["..."] },
///   "partitions": { "shared": "albert_train.ms", "task": "albert_infer.ms" },
///   "server_addr": "127.0.0.1:6666",
///   "retry": { "interval_ms": 500, "max_waits": 20 },
///   "min_match_ratio": 0.0,
///   "layouts": { "shared": { "embedding": 1024 }, "task": { "classifier": 20 } }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub task_name: String,
    pub mode: TrainingMode,
    pub partitions: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub server_addr: Option<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub min_match_ratio: f64,
    /// Tensor names and element counts per partition, read by the in-memory backend.
    #[serde(default)]
    pub layouts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl ClientConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    /// `Json` if the text is not a valid configuration, `InvalidConfig` if it is
    /// inconsistent.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and validates the JSON configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks the task name, the match ratio and that every partition of the selected plan
    /// has a model path.
    pub fn validate(&self) -> Result<()> {
        let selector = self.selector()?;

        for name in selector.plan().partition_names() {
            if !self.partitions.contains_key(name) {
                return Err(FlClientErr::InvalidConfig(format!(
                    "missing model path for partition {name}"
                )));
            }
        }

        Ok(())
    }

    /// Builds the process wide `ModeSelector` described by this configuration.
    pub fn selector(&self) -> Result<ModeSelector> {
        let policy = MatchPolicy::new(self.min_match_ratio).ok_or_else(|| {
            FlClientErr::InvalidConfig(format!(
                "min_match_ratio must be within [0, 1], got {}",
                self.min_match_ratio
            ))
        })?;

        ModeSelector::new(self.task_name.clone(), self.mode.clone(), policy)
    }

    /// Builds a registry with one target per configured partition.
    pub fn registry<B: SessionBackend>(&self, backend: B) -> ModelTargetRegistry<B> {
        self.partitions
            .iter()
            .fold(ModelTargetRegistry::new(backend), |registry, (name, path)| {
                registry.with_target(name.clone(), path.clone())
            })
    }

    /// Builds a `MemoryBackend` holding a zeroed model per partition with a layout.
    pub fn memory_backend(&self) -> MemoryBackend {
        self.partitions
            .iter()
            .filter_map(|(name, path)| Some((path, self.layouts.get(name)?)))
            .fold(MemoryBackend::new(), |backend, (path, layout)| {
                backend.with_model(path.clone(), layout.iter().map(|(t, &len)| (t.clone(), len)))
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn single_model_with_defaults() {
        let cfg = ClientConfig::from_json(
            r#"{
                "task_name": "lenet",
                "mode": { "kind": "single_model" },
                "partitions": { "lenet": "lenet_train.ms" }
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.retry.interval(), Duration::from_millis(1000));
        assert_eq!(cfg.retry.max_waits(), 10);
        assert_eq!(cfg.min_match_ratio, 0.0);
        assert!(cfg.server_addr.is_none());

        let registry = cfg.registry(MemoryBackend::new());
        assert_eq!(registry.model_path("lenet"), Some(Path::new("lenet_train.ms")));
    }

    #[test]
    fn hybrid_needs_both_partitions() {
        let res = ClientConfig::from_json(
            r#"{
                "task_name": "albert",
                "mode": { "kind": "hybrid", "shared_weights": ["a"], "task_weights": ["b"] },
                "partitions": { "shared": "train.ms" }
            }"#,
        );

        assert!(matches!(res, Err(FlClientErr::InvalidConfig(_))));
    }

    #[test]
    fn ratio_out_of_range_is_rejected() {
        let res = ClientConfig::from_json(
            r#"{
                "task_name": "lenet",
                "mode": { "kind": "single_model" },
                "partitions": { "lenet": "lenet.ms" },
                "min_match_ratio": 1.5
            }"#,
        );

        assert!(matches!(res, Err(FlClientErr::InvalidConfig(_))));
    }

    #[test]
    fn zero_max_waits_is_a_json_error() {
        let res = ClientConfig::from_json(
            r#"{
                "task_name": "lenet",
                "mode": { "kind": "single_model" },
                "partitions": { "lenet": "lenet.ms" },
                "retry": { "max_waits": 0 }
            }"#,
        );

        assert!(matches!(res, Err(FlClientErr::Json(_))));
    }

    #[test]
    fn retry_fields_are_read() {
        let cfg = ClientConfig::from_json(
            r#"{
                "task_name": "lenet",
                "mode": { "kind": "single_model" },
                "partitions": { "lenet": "lenet.ms" },
                "server_addr": "127.0.0.1:6666",
                "retry": { "interval_ms": 25, "max_waits": 3 }
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.retry.interval(), Duration::from_millis(25));
        assert_eq!(cfg.retry.max_waits(), 3);
        assert_eq!(cfg.server_addr.as_deref(), Some("127.0.0.1:6666"));
    }

    #[test]
    fn configured_ratio_accepts_its_exact_boundary() {
        let cfg = ClientConfig::from_json(
            r#"{
                "task_name": "lenet",
                "mode": { "kind": "single_model" },
                "partitions": { "lenet": "lenet.ms" },
                "min_match_ratio": 0.1
            }"#,
        )
        .unwrap();

        let policy = cfg.selector().unwrap().plan().policy();
        assert!(policy.accepts(1, 10));
        assert!(!policy.accepts(0, 10));
    }

    #[test]
    fn layouts_build_the_memory_backend() {
        let cfg = ClientConfig::from_json(
            r#"{
                "task_name": "lenet",
                "mode": { "kind": "single_model" },
                "partitions": { "lenet": "lenet.ms" },
                "layouts": { "lenet": { "conv1": 4, "fc": 2 } }
            }"#,
        )
        .unwrap();

        let backend = cfg.memory_backend();
        assert_eq!(backend.tensor("lenet.ms", "conv1"), Some(vec![0.0; 4]));
        assert_eq!(backend.tensor("lenet.ms", "fc"), Some(vec![0.0; 2]));
        assert_eq!(backend.tensor("lenet.ms", "missing"), None);
    }
}
