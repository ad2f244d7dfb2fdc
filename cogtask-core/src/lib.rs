pub mod block;
pub mod response;
pub mod stimulus;
pub mod trial;

pub use block::{BlockKind, FeedbackMode};
pub use response::{Key, ParseResponseError, Response, ResponseSet, Side};
pub use stimulus::{ArrowDirection, Colour, Stimulus, StimulusStage, StimulusType};
pub use trial::{Compatibility, Outcome, TrialResult, TrialSpec, TrialState};
