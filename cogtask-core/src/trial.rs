use crate::block::BlockKind;
use crate::response::Response;
use crate::stimulus::{Colour, Stimulus, StimulusStage, StimulusType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trial state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    AwaitingStimulusOnset,
    Displaying,
    AwaitingResponse,
    Scored,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    Compatible,
    Incompatible,
    Neutral,
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Compatibility::Compatible => "comp",
            Compatibility::Incompatible => "incomp",
            Compatibility::Neutral => "neutral",
        })
    }
}

/// Immutable description of one trial. The expected response is fixed here,
/// before the trial is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSpec {
    pub stages: Vec<StimulusStage>,
    pub condition: String,
    pub compatibility: Compatibility,
    pub expected: Response,
}

impl TrialSpec {
    pub fn single(
        stimulus: StimulusType,
        condition: impl Into<String>,
        compatibility: Compatibility,
        expected: Response,
    ) -> Self {
        Self::staged(
            vec![StimulusStage::immediate(stimulus)],
            condition,
            compatibility,
            expected,
        )
    }

    /// Stages are sorted by onset; an empty list is a programming error.
    pub fn staged(
        mut stages: Vec<StimulusStage>,
        condition: impl Into<String>,
        compatibility: Compatibility,
        expected: Response,
    ) -> Self {
        assert!(!stages.is_empty(), "a trial needs at least one stimulus stage");
        stages.sort_by_key(|s| s.onset_ms);
        Self {
            stages,
            condition: condition.into(),
            compatibility,
            expected,
        }
    }

    /// The last (complete) stimulus of the display.
    pub fn target(&self) -> &StimulusType {
        &self.stages[self.stages.len() - 1].stimulus
    }

    /// Index of the stage visible `elapsed_ms` after stimulus onset.
    pub fn stage_index_at(&self, elapsed_ms: u64) -> usize {
        self.stages
            .iter()
            .rposition(|s| s.onset_ms <= elapsed_ms)
            .unwrap_or(0)
    }

    pub fn last_onset_ms(&self) -> u64 {
        self.stages.last().map_or(0, |s| s.onset_ms)
    }

    pub fn describe(&self) -> String {
        self.target().describe()
    }
}

/// Scored category of a trial, coded 1-4 in output rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Correct,
    Error,
    TooSlow,
    TooFast,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Correct,
        Outcome::Error,
        Outcome::TooSlow,
        Outcome::TooFast,
    ];

    pub fn code(&self) -> u8 {
        match self {
            Outcome::Correct => 1,
            Outcome::Error => 2,
            Outcome::TooSlow => 3,
            Outcome::TooFast => 4,
        }
    }

    /// Position in a four-entry feedback text table.
    pub fn index(&self) -> usize {
        self.code() as usize - 1
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::Correct)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Correct => "correct",
            Outcome::Error => "error",
            Outcome::TooSlow => "too_slow",
            Outcome::TooFast => "too_fast",
        })
    }
}

/// Recorded result per trial. Appended once, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub block: u32,
    pub trial: u32,
    pub block_kind: BlockKind,
    pub condition: String,
    pub compatibility: Compatibility,
    pub stimulus: String,
    pub expected: Response,
    pub response: Option<Response>,
    /// `None` when the response window ran out.
    pub rt_ms: Option<f64>,
    pub outcome: Outcome,
    pub feedback_colour: Option<Colour>,
    pub timestamp_ns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Key;

    fn staged() -> TrialSpec {
        TrialSpec::staged(
            vec![
                StimulusStage {
                    onset_ms: 100,
                    stimulus: StimulusType::Letters {
                        text: "AAEAA".into(),
                    },
                },
                StimulusStage::immediate(StimulusType::Letters {
                    text: "AA AA".into(),
                }),
            ],
            "comp",
            Compatibility::Compatible,
            Response::Key(Key::char('x')),
        )
    }

    #[test]
    fn stages_are_ordered_by_onset() {
        let spec = staged();
        assert_eq!(spec.stages[0].onset_ms, 0);
        assert_eq!(spec.describe(), "AAEAA");
        assert_eq!(spec.last_onset_ms(), 100);
    }

    #[test]
    fn stage_index_follows_elapsed_time() {
        let spec = staged();
        assert_eq!(spec.stage_index_at(0), 0);
        assert_eq!(spec.stage_index_at(99), 0);
        assert_eq!(spec.stage_index_at(100), 1);
        assert_eq!(spec.stage_index_at(5_000), 1);
    }

    #[test]
    fn outcome_codes_match_feedback_table_order() {
        let codes: Vec<u8> = Outcome::ALL.iter().map(Outcome::code).collect();
        assert_eq!(codes, vec![1, 2, 3, 4]);
        assert_eq!(Outcome::TooFast.index(), 3);
        assert_eq!(Outcome::TooSlow.to_string(), "too_slow");
    }
}
