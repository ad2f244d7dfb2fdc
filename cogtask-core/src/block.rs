use serde::{Deserialize, Serialize};
use std::fmt;

/// Practice blocks are short and always give full feedback.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Practice,
    #[default]
    Experimental,
}

impl BlockKind {
    pub fn is_practice(&self) -> bool {
        matches!(self, BlockKind::Practice)
    }

    pub fn default_feedback(&self) -> FeedbackMode {
        match self {
            BlockKind::Practice => FeedbackMode::Full,
            BlockKind::Experimental => FeedbackMode::Blank,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::Practice => f.write_str("practice"),
            BlockKind::Experimental => f.write_str("experimental"),
        }
    }
}

/// What fills the feedback slot after a scored trial.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    /// Outcome text ("Correct", "Error", ...).
    Full,
    /// A neutral blank screen of the same duration.
    Blank,
}
