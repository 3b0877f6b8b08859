//! Training mode selection and the partition plan derived from it.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::{FlClientErr, Result};

/// Partition holding the shared backbone weights in hybrid mode.
pub const SHARED_PARTITION: &str = "shared";

/// Partition holding the task head (and whatever shared weights it reads) in hybrid mode.
pub const TASK_PARTITION: &str = "task";

/// The operating mode the whole process runs under.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainingMode {
    /// One unified model, named after the active task, receives every weight.
    SingleModel,
    /// Shared backbone and task head are updated independently.
    Hybrid {
        shared_weights: BTreeSet<String>,
        task_weights: BTreeSet<String>,
    },
}

/// How many of the returned weights must be recognized for a merge to go ahead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    min_match_ratio: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            min_match_ratio: 0.0,
        }
    }
}

impl MatchPolicy {
    /// Creates a new `MatchPolicy`.
    ///
    /// # Args
    /// * `min_match_ratio` - Fraction of returned weights, in `[0, 1]`, that must match a
    ///   partition. `0.0` accepts any partial match.
    ///
    /// # Returns
    /// `None` if the ratio is outside `[0, 1]` or not a number.
    pub fn new(min_match_ratio: f64) -> Option<Self> {
        (0.0..=1.0)
            .contains(&min_match_ratio)
            .then_some(Self { min_match_ratio })
    }

    pub fn min_match_ratio(&self) -> f64 {
        self.min_match_ratio
    }

    /// Whether `matched` out of `total` weights is enough.
    ///
    /// Both the quotient and a ratio read from decimal text are correctly rounded `f64`s,
    /// so a quotient exactly equal to the written ratio compares equal.
    pub fn accepts(&self, matched: usize, total: usize) -> bool {
        if total == 0 {
            return false;
        }

        matched as f64 / total as f64 >= self.min_match_ratio
    }
}

/// The set of weight names a partition recognizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFilter {
    Any,
    Only(BTreeSet<String>),
}

impl NameFilter {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(names) => names.contains(name),
        }
    }
}

/// A named, independently updatable slice of the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    name: String,
    filter: NameFilter,
}

impl Partition {
    pub fn new(name: impl Into<String>, filter: NameFilter) -> Self {
        Self {
            name: name.into(),
            filter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recognizes(&self, weight_name: &str) -> bool {
        self.filter.matches(weight_name)
    }
}

/// Ordered partitions a response's weights are routed to.
///
/// Declaration order is application order: in hybrid mode the shared partition always
/// comes before the task partition.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightPartitionPlan {
    partitions: Vec<Partition>,
    policy: MatchPolicy,
}

impl WeightPartitionPlan {
    /// A plan with a single partition named `task_name` that takes every weight.
    pub fn single(task_name: &str) -> Self {
        Self {
            partitions: vec![Partition::new(task_name, NameFilter::Any)],
            policy: MatchPolicy::default(),
        }
    }

    /// A plan routing weights to the shared partition and then the task partition.
    pub fn hybrid(shared_weights: BTreeSet<String>, task_weights: BTreeSet<String>) -> Self {
        Self {
            partitions: vec![
                Partition::new(SHARED_PARTITION, NameFilter::Only(shared_weights)),
                Partition::new(TASK_PARTITION, NameFilter::Only(task_weights)),
            ],
            policy: MatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn partition_names(&self) -> impl Iterator<Item = &str> {
        self.partitions.iter().map(Partition::name)
    }
}

/// Process wide training mode configuration, read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeSelector {
    task_name: String,
    mode: TrainingMode,
    policy: MatchPolicy,
}

impl ModeSelector {
    /// Creates a new `ModeSelector`.
    ///
    /// # Args
    /// * `task_name` - The active federated learning task.
    /// * `mode` - Single model or hybrid training.
    /// * `policy` - The partial match policy applied on merge.
    ///
    /// # Returns
    /// An `InvalidConfig` error if the task name is empty or a hybrid name set is empty.
    pub fn new(
        task_name: impl Into<String>,
        mode: TrainingMode,
        policy: MatchPolicy,
    ) -> Result<Self> {
        let task_name = task_name.into();
        if task_name.is_empty() {
            return Err(FlClientErr::InvalidConfig("task name must not be empty".into()));
        }

        if let TrainingMode::Hybrid {
            shared_weights,
            task_weights,
        } = &mode
        {
            if shared_weights.is_empty() || task_weights.is_empty() {
                return Err(FlClientErr::InvalidConfig(
                    "hybrid mode needs both shared and task weight names".into(),
                ));
            }
        }

        Ok(Self {
            task_name,
            mode,
            policy,
        })
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn mode(&self) -> &TrainingMode {
        &self.mode
    }

    /// Derives the partition plan for the configured mode.
    pub fn plan(&self) -> WeightPartitionPlan {
        let plan = match &self.mode {
            TrainingMode::SingleModel => WeightPartitionPlan::single(&self.task_name),
            TrainingMode::Hybrid {
                shared_weights,
                task_weights,
            } => WeightPartitionPlan::hybrid(shared_weights.clone(), task_weights.clone()),
        };

        plan.with_policy(self.policy)
    }
}
