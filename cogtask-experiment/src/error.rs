use cogtask_core::Response;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with a run configuration, caught before the first trial.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("too_fast ({too_fast_ms} ms) must be below too_slow ({too_slow_ms} ms)")]
    Thresholds { too_fast_ms: u64, too_slow_ms: u64 },

    #[error("at least {needed} response keys are required, got {got}")]
    TooFewKeys { needed: usize, got: usize },

    #[error("abort key {0} is also a response key")]
    AbortKeyInResponses(Response),

    #[error("no blocks configured")]
    NoBlocks,

    #[error("block {block} requests zero trials")]
    EmptyBlock { block: usize },

    #[error("false feedback rate {0} is outside 0..=1")]
    FalseFeedbackRate(f64),

    #[error("error-rate prompt bounds are inverted: low {low}% > high {high}%")]
    ErrorRateBounds { low: u32, high: u32 },

    #[error("no sentences configured for self-paced reading")]
    NoSentences,

    #[error("reading line width must be positive")]
    LineWidth,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Run-list generation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("block {block}: {requested} trials cannot be split evenly across {templates} templates")]
    UnevenTrialCount {
        block: usize,
        requested: usize,
        templates: usize,
    },

    #[error("no trial templates to sequence")]
    NoTemplates,
}
