pub mod aggregate;
pub mod classify;
pub mod config;
pub mod display;
pub mod error;
pub mod participant;
pub mod reading;
pub mod runner;
pub mod sequence;
pub mod session;
pub mod sink;
pub mod stimuli;

pub use aggregate::{BlockSummary, RunContext};
pub use classify::{Observation, classify};
pub use config::{
    BlockConfig, FeedbackConfig, Messages, OutputConfig, OutputFormat, ReadingConfig,
    ResponseConfig, ResponseMapping, RunConfig, Thresholds, TimingConfig,
};
pub use display::{Display, NullDisplay, RecordingDisplay, Screen, ScreenShot};
pub use error::{ConfigError, SequenceError};
pub use participant::{COMPLETION_CODE_LEN, Participant, completion_code};
pub use reading::{MaskKind, MovingWindow, ReadingFrame, ReadingResult, mask_text};
pub use runner::{InputDisposition, RunnerEvent, TrialPlan, TrialRunner};
pub use sequence::{RunList, Step, balanced_sequence_seeded, build_run_list, generate_balanced_sequence};
pub use session::{RunPlan, Session, SessionEvent, SessionStatus};
pub use sink::{DataSink, MemorySink, RunData};
pub use stimuli::{StimulusSetKind, Templates};
