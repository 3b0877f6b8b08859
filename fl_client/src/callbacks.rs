//! Per run type callbacks, resolved once when a run starts.

use std::num::NonZeroUsize;

use serde::Deserialize;

use crate::{FlClientErr, Result};

/// What a local run of the model is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Train,
    Eval,
    Infer,
}

/// Data produced by one step of a local run.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    pub loss: Option<f32>,
    /// `batch_size * num_classes` scores, sample major.
    pub logits: &'a [f32],
}

/// A single callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    Loss {
        losses: Vec<f32>,
    },
    ClassifierAccuracy {
        num_classes: NonZeroUsize,
        targets: Vec<usize>,
        seen: usize,
        correct: usize,
    },
    Predict {
        num_classes: NonZeroUsize,
        predictions: Vec<usize>,
    },
}

fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &s)| {
            if s > max { (i, s) } else { (best, max) }
        })
        .0
}

impl Callback {
    fn on_step(&mut self, batch_size: usize, step: Step<'_>) -> Result<()> {
        match self {
            Self::Loss { losses } => losses.extend(step.loss),
            Self::ClassifierAccuracy {
                num_classes,
                targets,
                seen,
                correct,
            } => {
                let samples = samples(step.logits, batch_size, *num_classes)?;
                for scores in samples {
                    // The last batch may be padded past the labelled samples.
                    let Some(&target) = targets.get(*seen) else {
                        break;
                    };

                    if argmax(scores) == target {
                        *correct += 1;
                    }
                    *seen += 1;
                }
            }
            Self::Predict {
                num_classes,
                predictions,
            } => {
                let samples = samples(step.logits, batch_size, *num_classes)?;
                predictions.extend(samples.map(argmax));
            }
        }

        Ok(())
    }
}

fn samples(
    logits: &[f32],
    batch_size: usize,
    num_classes: NonZeroUsize,
) -> Result<std::slice::ChunksExact<'_, f32>> {
    if logits.len() != batch_size * num_classes.get() {
        return Err(FlClientErr::InvalidArgument(
            "logits length must be batch_size * num_classes",
        ));
    }

    Ok(logits.chunks_exact(num_classes.get()))
}

/// The callbacks of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackSet {
    run_type: RunType,
    batch_size: NonZeroUsize,
    callbacks: Vec<Callback>,
}

impl CallbackSet {
    /// Resolves the callbacks for a run.
    ///
    /// # Args
    /// * `run_type` - Train, eval or infer.
    /// * `batch_size` - Samples per step.
    /// * `num_classes` - Scores per sample.
    /// * `targets` - Labels of the evaluation samples; evaluation without labels has no
    ///   accuracy callback.
    pub fn for_run(
        run_type: RunType,
        batch_size: NonZeroUsize,
        num_classes: NonZeroUsize,
        targets: Option<Vec<usize>>,
    ) -> Self {
        let callbacks = match (run_type, targets) {
            (RunType::Train, _) => vec![Callback::Loss { losses: Vec::new() }],
            (RunType::Eval, Some(targets)) => vec![Callback::ClassifierAccuracy {
                num_classes,
                targets,
                seen: 0,
                correct: 0,
            }],
            (RunType::Eval, None) => Vec::new(),
            (RunType::Infer, _) => vec![Callback::Predict {
                num_classes,
                predictions: Vec::new(),
            }],
        };

        Self {
            run_type,
            batch_size,
            callbacks,
        }
    }

    pub fn run_type(&self) -> RunType {
        self.run_type
    }

    pub fn callbacks(&self) -> &[Callback] {
        &self.callbacks
    }

    /// Feeds one step to every callback.
    ///
    /// # Errors
    /// `InvalidArgument` if the logits don't match the batch shape.
    pub fn on_step(&mut self, step: Step<'_>) -> Result<()> {
        let batch_size = self.batch_size.get();
        self.callbacks
            .iter_mut()
            .try_for_each(|cb| cb.on_step(batch_size, step))
    }

    /// Recorded losses of a training run.
    pub fn losses(&self) -> &[f32] {
        self.callbacks
            .iter()
            .find_map(|cb| match cb {
                Callback::Loss { losses } => Some(losses.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Accuracy of an evaluation run.
    ///
    /// # Returns
    /// `None` without an accuracy callback or before any labelled sample was seen.
    pub fn eval_accuracy(&self) -> Option<f32> {
        self.callbacks.iter().find_map(|cb| match cb {
            Callback::ClassifierAccuracy { seen, correct, .. } if *seen > 0 => {
                Some(*correct as f32 / *seen as f32)
            }
            _ => None,
        })
    }

    /// Predicted classes of an inference run, trimmed to `sample_count`.
    pub fn infer_results(&self, sample_count: usize) -> Vec<usize> {
        self.callbacks
            .iter()
            .find_map(|cb| match cb {
                Callback::Predict { predictions, .. } => {
                    Some(predictions.iter().copied().take(sample_count).collect())
                }
                _ => None,
            })
            .unwrap_or_default()
    }
}
