//! Routes a response's weights to the partitions of a plan and applies them.

use log::{debug, warn};

use crate::{
    FlClientErr, Result, WeightBuffer, WeightPartitionPlan,
    registry::{ModelTargetRegistry, SessionBackend},
};

/// What a successful merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Partitions that received weights, in application order, with the buffer count.
    pub applied: Vec<(String, usize)>,
    /// Weights no partition recognized.
    pub dropped: usize,
}

impl MergeReport {
    /// Total number of buffer applications, counting a weight once per partition.
    pub fn applied_buffers(&self) -> usize {
        self.applied.iter().map(|(_, n)| n).sum()
    }
}

/// One bucket per plan partition, in plan order.
fn partition<'w>(
    weights: &'w [WeightBuffer],
    plan: &WeightPartitionPlan,
) -> (Vec<Vec<&'w WeightBuffer>>, usize) {
    let mut buckets = vec![Vec::new(); plan.partitions().len()];
    let mut dropped = 0;

    for w in weights {
        let mut matched = false;
        for (bucket, part) in buckets.iter_mut().zip(plan.partitions()) {
            if part.recognizes(w.name()) {
                bucket.push(w);
                matched = true;
            }
        }

        if matched {
            debug!(weight = w.name(), bytes = w.byte_len(); "weight routed");
        } else {
            dropped += 1;
            debug!(weight = w.name(); "weight dropped, no partition recognizes it");
        }
    }

    (buckets, dropped)
}

/// Merges `weights` into the partitions named by `plan`.
///
/// Non-empty buckets are applied in plan order, each under its own session. The first
/// failure aborts the remaining buckets; buckets applied before it stay applied.
///
/// # Args
/// * `weights` - The weights of a successful response.
/// * `plan` - How weights are routed to partitions.
/// * `registry` - Where each partition's model lives.
///
/// # Returns
/// A `MergeReport` describing what was applied and what was dropped.
///
/// # Errors
/// * `EmptyWeightSet` if `weights` is empty.
/// * `NoMatchingWeights` if no weight is recognized by any partition.
/// * `PartialMatch` if fewer weights than the plan's policy requires are recognized.
/// * `ApplyFailed` naming the first partition that could not be updated.
pub fn merge<B: SessionBackend>(
    weights: &[WeightBuffer],
    plan: &WeightPartitionPlan,
    registry: &ModelTargetRegistry<B>,
) -> Result<MergeReport> {
    if weights.is_empty() {
        return Err(FlClientErr::EmptyWeightSet);
    }

    let (buckets, dropped) = partition(weights, plan);
    let total = weights.len();
    let matched = total - dropped;

    if matched == 0 {
        warn!(dropped = dropped; "no returned weight matches a local partition");
        return Err(FlClientErr::NoMatchingWeights { dropped });
    }

    let policy = plan.policy();
    if !policy.accepts(matched, total) {
        return Err(FlClientErr::PartialMatch {
            matched,
            total,
            required: policy.min_match_ratio(),
        });
    }

    let mut report = MergeReport {
        applied: Vec::with_capacity(buckets.len()),
        dropped,
    };

    for (bucket, part) in buckets.iter().zip(plan.partitions()) {
        if bucket.is_empty() {
            continue;
        }

        registry.apply(part.name(), bucket)?;
        report.applied.push((part.name().to_string(), bucket.len()));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{MatchPolicy, registry::MemoryBackend};

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn buf(name: &str) -> WeightBuffer {
        WeightBuffer::new(name, vec![0; 4]).unwrap()
    }

    #[test]
    fn empty_weights_fail_before_anything_else() {
        let registry = ModelTargetRegistry::new(MemoryBackend::new());
        let plan = WeightPartitionPlan::single("lenet");

        assert!(matches!(
            merge(&[], &plan, &registry),
            Err(FlClientErr::EmptyWeightSet)
        ));
    }

    #[test]
    fn bucketing_routes_shared_names_to_both_partitions() {
        let plan = WeightPartitionPlan::hybrid(names(&["b.w"]), names(&["b.w", "h.w"]));
        let weights = [buf("b.w"), buf("h.w"), buf("other")];

        let (buckets, dropped) = partition(&weights, &plan);

        let shared: Vec<_> = buckets[0].iter().map(|w| w.name()).collect();
        let task: Vec<_> = buckets[1].iter().map(|w| w.name()).collect();
        assert_eq!(shared, ["b.w"]);
        assert_eq!(task, ["b.w", "h.w"]);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn no_match_is_an_error() {
        let registry = ModelTargetRegistry::new(MemoryBackend::new());
        let plan = WeightPartitionPlan::hybrid(names(&["b.w"]), names(&["h.w"]));

        assert!(matches!(
            merge(&[buf("x"), buf("y")], &plan, &registry),
            Err(FlClientErr::NoMatchingWeights { dropped: 2 })
        ));
    }

    #[test]
    fn partial_match_below_ratio_is_rejected() {
        let backend = MemoryBackend::new().with_model("shared.ms", [("b.w", 1)]);
        let registry = ModelTargetRegistry::new(backend).with_target("shared", "shared.ms");
        let plan = WeightPartitionPlan::hybrid(names(&["b.w"]), names(&["h.w"]))
            .with_policy(MatchPolicy::new(0.75).unwrap());

        let res = merge(&[buf("b.w"), buf("x")], &plan, &registry);
        assert!(matches!(
            res,
            Err(FlClientErr::PartialMatch {
                matched: 1,
                total: 2,
                ..
            })
        ));
    }

    #[test]
    fn partial_match_is_accepted_by_default() {
        let backend = MemoryBackend::new().with_model("shared.ms", [("b.w", 1)]);
        let registry = ModelTargetRegistry::new(backend).with_target("shared", "shared.ms");
        let plan = WeightPartitionPlan::hybrid(names(&["b.w"]), names(&["h.w"]));

        let report = merge(&[buf("b.w"), buf("x")], &plan, &registry).unwrap();
        assert_eq!(report.applied, [("shared".to_string(), 1)]);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.applied_buffers(), 1);
    }
}
