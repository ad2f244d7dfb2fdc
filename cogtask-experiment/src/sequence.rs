use crate::config::RunConfig;
use crate::error::SequenceError;
use crate::runner::TrialPlan;
use crate::stimuli::Templates;
use cogtask_core::{BlockKind, FeedbackMode, TrialSpec};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// One entry of the flat run list.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Text screen that waits for any key.
    Message(String),
    /// Zero-length marker opening a block.
    BlockStart {
        block: u32,
        kind: BlockKind,
        feedback: FeedbackMode,
    },
    Fixation {
        duration_ms: u64,
    },
    Stimulus {
        spec: TrialSpec,
        response_window_ms: u64,
    },
    Feedback {
        mode: FeedbackMode,
        duration_ms: u64,
    },
    Interval {
        duration_ms: u64,
    },
    Reading {
        sentence: String,
    },
    /// Between-block performance screen; waits for any key.
    BlockSummary {
        block: u32,
    },
    Save,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunList {
    steps: Vec<Step>,
    total_blocks: usize,
}

impl RunList {
    pub fn new(steps: Vec<Step>) -> Self {
        let total_blocks = steps
            .iter()
            .filter(|s| matches!(s, Step::BlockStart { .. }))
            .count();
        Self {
            steps,
            total_blocks,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    /// Trial specs of the run in presentation order.
    pub fn trials(&self) -> impl Iterator<Item = &TrialSpec> {
        self.steps.iter().filter_map(|s| match s {
            Step::Stimulus { spec, .. } => Some(spec),
            _ => None,
        })
    }

    /// Trial specs belonging to one block (1-based).
    pub fn block_trials(&self, block: u32) -> Vec<&TrialSpec> {
        let mut current = None;
        let mut out = Vec::new();
        for step in &self.steps {
            match step {
                Step::BlockStart { block: b, .. } => current = Some(*b),
                Step::Stimulus { spec, .. } if current == Some(block) => out.push(spec),
                _ => {}
            }
        }
        out
    }

    /// The trial starting at `index`: a fixation step followed by its
    /// stimulus and feedback steps.
    pub fn trial_plan(&self, index: usize) -> Option<TrialPlan> {
        match self.steps.get(index..index + 3)? {
            [
                Step::Fixation { duration_ms },
                Step::Stimulus {
                    spec,
                    response_window_ms,
                },
                Step::Feedback {
                    mode,
                    duration_ms: feedback_ms,
                },
            ] => Some(TrialPlan {
                spec: spec.clone(),
                fixation_ms: *duration_ms,
                response_window_ms: *response_window_ms,
                feedback: *mode,
                feedback_ms: *feedback_ms,
            }),
            _ => None,
        }
    }
}

/// Exact repetitions per template for `requested` trials.
///
/// Uneven splits are rejected rather than truncated.
pub fn repeats_per_template(
    block: usize,
    requested: usize,
    templates: usize,
) -> Result<usize, SequenceError> {
    if templates == 0 {
        return Err(SequenceError::NoTemplates);
    }
    if requested == 0 || requested % templates != 0 {
        return Err(SequenceError::UnevenTrialCount {
            block,
            requested,
            templates,
        });
    }
    Ok(requested / templates)
}

/// Every template exactly `count_per_template` times, shuffled.
pub fn generate_balanced_sequence<T: Clone, R: Rng + ?Sized>(
    templates: &[T],
    count_per_template: usize,
    rng: &mut R,
) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(templates.len() * count_per_template);
    for _ in 0..count_per_template {
        out.extend_from_slice(templates);
    }
    out.shuffle(rng);
    out
}

/// [`generate_balanced_sequence`] with its own generator, deterministic for
/// a given seed.
pub fn balanced_sequence_seeded<T: Clone>(
    templates: &[T],
    count_per_template: usize,
    seed: u64,
) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    generate_balanced_sequence(templates, count_per_template, &mut rng)
}

/// Lays out the whole run: opening messages, every block with its summary
/// screen, the save step and the debrief.
pub fn build_run_list<R: Rng + ?Sized>(
    config: &RunConfig,
    templates: &Templates,
    rng: &mut R,
) -> Result<RunList, SequenceError> {
    if templates.is_empty() {
        return Err(SequenceError::NoTemplates);
    }

    let mut steps = Vec::new();
    if let Some(text) = &config.messages.welcome {
        steps.push(Step::Message(text.clone()));
    }
    if let Some(text) = &config.messages.instructions {
        steps.push(Step::Message(text.clone()));
    }

    let timing = &config.timing;
    for (i, block) in config.blocks.iter().enumerate() {
        let number = i as u32 + 1;
        let repeats = repeats_per_template(i + 1, block.trials, templates.len())?;
        let feedback = block.feedback_mode();
        steps.push(Step::BlockStart {
            block: number,
            kind: block.kind,
            feedback,
        });

        match templates {
            Templates::Trials(specs) => {
                for spec in generate_balanced_sequence(specs, repeats, rng) {
                    steps.push(Step::Fixation {
                        duration_ms: timing.fixation_ms,
                    });
                    steps.push(Step::Stimulus {
                        spec,
                        response_window_ms: config.thresholds.too_slow_ms,
                    });
                    steps.push(Step::Feedback {
                        mode: feedback,
                        duration_ms: timing.feedback_ms,
                    });
                    steps.push(Step::Interval {
                        duration_ms: timing.iti_ms,
                    });
                }
            }
            Templates::Sentences(sentences) => {
                for sentence in generate_balanced_sequence(sentences, repeats, rng) {
                    steps.push(Step::Reading { sentence });
                    steps.push(Step::Interval {
                        duration_ms: timing.iti_ms,
                    });
                }
            }
        }
        steps.push(Step::BlockSummary { block: number });
        debug!(block = number, kind = %block.kind, trials = block.trials, "block laid out");
    }

    steps.push(Step::Save);
    if let Some(text) = &config.messages.debrief {
        steps.push(Step::Message(text.clone()));
    }
    Ok(RunList::new(steps))
}
