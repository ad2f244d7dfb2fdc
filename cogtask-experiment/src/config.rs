use crate::error::ConfigError;
use crate::reading::MaskKind;
use crate::stimuli::{CLICKS, StimulusSetKind};
use cogtask_core::{BlockKind, Colour, FeedbackMode, Key, Outcome, Response, ResponseSet};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything fixed at experiment start. Loaded from TOML; any missing field
/// falls back to the standard arrow-flanker defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub experiment_name: String,
    pub thresholds: Thresholds,
    pub timing: TimingConfig,
    pub responses: ResponseConfig,
    pub feedback: FeedbackConfig,
    pub stimuli: StimulusSetKind,
    pub blocks: Vec<BlockConfig>,
    pub messages: Messages,
    pub reading: ReadingConfig,
    pub output: OutputConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            experiment_name: "flanker".into(),
            thresholds: Thresholds::default(),
            timing: TimingConfig::default(),
            responses: ResponseConfig::default(),
            feedback: FeedbackConfig::default(),
            stimuli: StimulusSetKind::ArrowFlanker,
            blocks: vec![
                BlockConfig::new(BlockKind::Practice, 8),
                BlockConfig::new(BlockKind::Experimental, 48),
                BlockConfig::new(BlockKind::Experimental, 48),
            ],
            messages: Messages::default(),
            reading: ReadingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        let keyed = !self.stimuli.is_reading() && !self.stimuli.uses_mouse();
        if keyed && self.responses.keys.len() < 2 {
            return Err(ConfigError::TooFewKeys {
                needed: 2,
                got: self.responses.keys.len(),
            });
        }
        let abort = Response::Key(self.responses.abort);
        if self.responses.keys.contains(&abort) || self.reading.advance == abort {
            return Err(ConfigError::AbortKeyInResponses(abort));
        }

        if self.blocks.is_empty() {
            return Err(ConfigError::NoBlocks);
        }
        if let Some(block) = self.blocks.iter().position(|b| b.trials == 0) {
            return Err(ConfigError::EmptyBlock { block: block + 1 });
        }

        let rate = self.feedback.false_feedback_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::FalseFeedbackRate(rate));
        }
        if self.feedback.error_rate_low > self.feedback.error_rate_high {
            return Err(ConfigError::ErrorRateBounds {
                low: self.feedback.error_rate_low,
                high: self.feedback.error_rate_high,
            });
        }

        if self.stimuli.is_reading() {
            if self.reading.sentences.is_empty() {
                return Err(ConfigError::NoSentences);
            }
            if self.reading.line_width == 0 {
                return Err(ConfigError::LineWidth);
            }
        }
        Ok(())
    }

    /// Inputs that qualify as an answer during a trial.
    pub fn allowed_responses(&self, mapping: &ResponseMapping) -> ResponseSet {
        if self.stimuli.uses_mouse() {
            return ResponseSet::new(CLICKS);
        }
        ResponseSet::new(mapping.keys.iter().copied())
    }
}

/// Response-window bounds. Both bounds belong to the invalid side:
/// `rt <= too_fast` is too fast, `rt >= too_slow` is too slow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub too_fast_ms: u64,
    pub too_slow_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            too_fast_ms: 150,
            too_slow_ms: 1500,
        }
    }
}

impl Thresholds {
    pub fn new(too_fast_ms: u64, too_slow_ms: u64) -> Self {
        Self {
            too_fast_ms,
            too_slow_ms,
        }
    }

    pub fn too_fast(&self) -> Duration {
        Duration::from_millis(self.too_fast_ms)
    }

    pub fn too_slow(&self) -> Duration {
        Duration::from_millis(self.too_slow_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.too_fast_ms >= self.too_slow_ms {
            return Err(ConfigError::Thresholds {
                too_fast_ms: self.too_fast_ms,
                too_slow_ms: self.too_slow_ms,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub fixation_ms: u64,
    pub feedback_ms: u64,
    pub iti_ms: u64,
    /// Delay between the flanker-only preview and the full letter array.
    pub flanker_onset_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fixation_ms: 750,
            feedback_ms: 750,
            iti_ms: 1000,
            flanker_onset_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Ordered: the first key answers the first response category
    /// (left / vowel / red), the second the other one.
    pub keys: Vec<Response>,
    pub abort: Key,
    /// Swap the key order for a random half of participants.
    pub counterbalance: bool,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            keys: vec![
                Response::Key(Key::char('D')),
                Response::Key(Key::char('J')),
            ],
            abort: Key::Escape,
            counterbalance: false,
        }
    }
}

/// Key order chosen once per run and held constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMapping {
    /// 1 = configured order, 2 = reversed.
    pub mapping: u8,
    pub keys: Vec<Response>,
}

impl ResponseConfig {
    pub fn mapping<R: Rng + ?Sized>(&self, rng: &mut R) -> ResponseMapping {
        if self.counterbalance && rng.random_bool(0.5) {
            let mut keys = self.keys.clone();
            keys.reverse();
            ResponseMapping { mapping: 2, keys }
        } else {
            ResponseMapping {
                mapping: 1,
                keys: self.keys.clone(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Indexed by outcome code - 1: correct, error, too slow, too fast.
    pub text: [String; 4],
    pub correct_colour: Colour,
    pub error_colour: Colour,
    pub false_colour: Colour,
    /// Share of correct experimental trials shown in `false_colour`.
    pub false_feedback_rate: f64,
    pub error_rate_low: u32,
    pub error_rate_high: u32,
    pub faster_prompt: String,
    pub accuracy_prompt: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            text: [
                "Correct".into(),
                "Error".into(),
                "Too Slow".into(),
                "Too Fast".into(),
            ],
            correct_colour: Colour::GREEN,
            error_colour: Colour::RED,
            false_colour: Colour::BLUE,
            false_feedback_rate: 0.0,
            error_rate_low: 5,
            error_rate_high: 15,
            faster_prompt: "Please respond faster!".into(),
            accuracy_prompt: "Please respond more accurately!".into(),
        }
    }
}

impl FeedbackConfig {
    pub fn text_for(&self, outcome: Outcome) -> &str {
        &self.text[outcome.index()]
    }

    pub fn colour_for(&self, outcome: Outcome) -> Colour {
        if outcome.is_correct() {
            self.correct_colour
        } else {
            self.error_colour
        }
    }

    /// Speed/accuracy prompt for a block's error rate, if one applies.
    pub fn prompt_for(&self, error_rate: u32) -> Option<&str> {
        if error_rate < self.error_rate_low {
            Some(&self.faster_prompt)
        } else if error_rate > self.error_rate_high {
            Some(&self.accuracy_prompt)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub kind: BlockKind,
    pub trials: usize,
    #[serde(default)]
    pub feedback: Option<FeedbackMode>,
}

impl BlockConfig {
    pub fn new(kind: BlockKind, trials: usize) -> Self {
        Self {
            kind,
            trials,
            feedback: None,
        }
    }

    pub fn feedback_mode(&self) -> FeedbackMode {
        self.feedback.unwrap_or_else(|| self.kind.default_feedback())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub welcome: Option<String>,
    pub instructions: Option<String>,
    /// `{code}` is replaced with the run's completion code.
    pub debrief: Option<String>,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            welcome: Some("Welcome. Press any key to continue.".into()),
            instructions: Some(
                "Respond to the central stimulus as quickly and accurately as possible.\n\
                 Press any key to start."
                    .into(),
            ),
            debrief: Some(
                "The experiment is finished.\nCode: {code}\nPress any key to end the experiment!"
                    .into(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    pub sentences: Vec<String>,
    pub mask: MaskKind,
    pub mask_char: char,
    /// Keep the mask line under words that are already visible.
    pub mask_on_word: bool,
    /// Characters per line before wrapping.
    pub line_width: usize,
    pub advance: Response,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            sentences: Vec::new(),
            mask: MaskKind::Single,
            mask_char: '_',
            mask_on_word: true,
            line_width: 60,
            advance: Response::Key(Key::Space),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Local directory for data files and for upload fallbacks.
    pub dir: PathBuf,
    pub data_endpoint: Option<String>,
    pub code_endpoint: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            dir: PathBuf::from("data"),
            data_endpoint: None,
            code_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogtask_core::Side;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn default_config_is_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn parses_partial_toml() {
        let cfg = RunConfig::from_toml_str(
            r#"
            experiment_name = "flanker_pes"
            stimuli = "letter_flanker"

            [thresholds]
            too_fast_ms = 250
            too_slow_ms = 1150

            [responses]
            keys = ["X", "M"]
            counterbalance = true

            [[blocks]]
            kind = "practice"
            trials = 48

            [[blocks]]
            kind = "experimental"
            trials = 96
            feedback = "full"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.thresholds, Thresholds::new(250, 1150));
        assert_eq!(cfg.stimuli, StimulusSetKind::LetterFlanker);
        assert_eq!(cfg.blocks.len(), 2);
        assert_eq!(cfg.blocks[0].feedback_mode(), FeedbackMode::Full);
        assert_eq!(cfg.blocks[1].feedback_mode(), FeedbackMode::Full);
        assert_eq!(cfg.timing, TimingConfig::default());
        assert_eq!(cfg.responses.abort, Key::Escape);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut cfg = RunConfig::default();
        cfg.thresholds = Thresholds::new(1500, 1500);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Thresholds { .. })
        ));
    }

    #[test]
    fn rejects_abort_key_as_response() {
        let mut cfg = RunConfig::default();
        cfg.responses.keys.push(Response::Key(Key::Escape));
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::AbortKeyInResponses(_))
        ));
    }

    #[test]
    fn rejects_empty_block() {
        let mut cfg = RunConfig::default();
        cfg.blocks[1].trials = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::EmptyBlock { block: 2 })
        ));
    }

    #[test]
    fn reading_requires_sentences() {
        let mut cfg = RunConfig::default();
        cfg.stimuli = StimulusSetKind::SelfPacedReading;
        assert!(matches!(cfg.validate(), Err(ConfigError::NoSentences)));
        cfg.reading.sentences.push("The cat sat.".into());
        cfg.validate().unwrap();
    }

    #[test]
    fn mouse_negation_answers_with_clicks_only() {
        let mut cfg = RunConfig::from_toml_str(
            r#"
            stimuli = "mouse_negation"

            [responses]
            keys = []
            "#,
        )
        .unwrap();
        let mapping = cfg.responses.mapping(&mut StdRng::seed_from_u64(0));
        let allowed = cfg.allowed_responses(&mapping);
        assert!(allowed.contains(&Response::Click(Side::Left)));
        assert!(allowed.contains(&Response::Click(Side::Right)));
        assert!(!allowed.contains(&Response::Key(Key::char('D'))));

        cfg.stimuli = StimulusSetKind::AffirmationNegation;
        assert!(matches!(cfg.validate(), Err(ConfigError::TooFewKeys { .. })));
    }

    #[test]
    fn mapping_without_counterbalance_keeps_order() {
        let cfg = ResponseConfig::default();
        let m = cfg.mapping(&mut StdRng::seed_from_u64(1));
        assert_eq!(m.mapping, 1);
        assert_eq!(m.keys, cfg.keys);
    }

    #[test]
    fn counterbalanced_mapping_uses_both_orders() {
        let cfg = ResponseConfig {
            counterbalance: true,
            ..ResponseConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let mappings: Vec<ResponseMapping> = (0..64).map(|_| cfg.mapping(&mut rng)).collect();
        assert!(mappings.iter().any(|m| m.mapping == 1));
        let reversed = mappings.iter().find(|m| m.mapping == 2).unwrap();
        assert_eq!(reversed.keys[0], cfg.keys[1]);
    }

    #[test]
    fn feedback_prompt_bands() {
        let fb = FeedbackConfig::default();
        assert_eq!(fb.prompt_for(2), Some("Please respond faster!"));
        assert_eq!(fb.prompt_for(10), None);
        assert_eq!(fb.prompt_for(20), Some("Please respond more accurately!"));
        assert_eq!(fb.text_for(Outcome::TooFast), "Too Fast");
        assert_eq!(fb.colour_for(Outcome::Error), Colour::RED);
    }
}
