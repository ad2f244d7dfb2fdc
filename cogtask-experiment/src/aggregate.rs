use crate::classify::Observation;
use crate::config::FeedbackConfig;
use crate::reading::{ReadingResult, WordRead};
use cogtask_core::{BlockKind, Colour, Outcome, TrialResult, TrialSpec};

/// Shown in place of a statistic that has no data behind it.
pub const NO_DATA: &str = "N/A";

/// Derived view over one block's slice of the result log.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSummary {
    pub block: u32,
    pub n_trials: usize,
    pub n_errors: usize,
    /// Mean RT over the block's correct trials; `None` if there were none.
    pub mean_rt_ms: Option<f64>,
}

impl BlockSummary {
    pub fn from_results(results: &[TrialResult], block: u32) -> Self {
        let in_block = || results.iter().filter(move |r| r.block == block);
        let n_trials = in_block().count();
        let n_errors = in_block().filter(|r| !r.outcome.is_correct()).count();
        let correct_rts: Vec<f64> = in_block()
            .filter(|r| r.outcome.is_correct())
            .filter_map(|r| r.rt_ms)
            .collect();
        let mean_rt_ms = if correct_rts.is_empty() {
            None
        } else {
            Some(correct_rts.iter().sum::<f64>() / correct_rts.len() as f64)
        };
        Self {
            block,
            n_trials,
            n_errors,
            mean_rt_ms,
        }
    }

    /// Percentage of non-correct trials, rounded; `None` for an empty block.
    pub fn error_rate(&self) -> Option<u32> {
        if self.n_trials == 0 {
            return None;
        }
        Some((100.0 * self.n_errors as f64 / self.n_trials as f64).round() as u32)
    }

    pub fn mean_rt_text(&self) -> String {
        match self.mean_rt_ms {
            Some(ms) => format!("{} ms", ms.round() as u64),
            None => NO_DATA.to_string(),
        }
    }

    pub fn error_rate_text(&self) -> String {
        match self.error_rate() {
            Some(pct) => format!("{pct} %"),
            None => NO_DATA.to_string(),
        }
    }

    /// Text of the between-block screen.
    pub fn render(&self, total_blocks: usize, feedback: &FeedbackConfig) -> String {
        let mut text = format!(
            "Block: {} of {}\nMean RT: {}\nError Rate: {}\n",
            self.block,
            total_blocks,
            self.mean_rt_text(),
            self.error_rate_text()
        );
        if let Some(prompt) = self.error_rate().and_then(|e| feedback.prompt_for(e)) {
            text.push_str(prompt);
            text.push('\n');
        }
        text.push_str("Press any key to continue the experiment!");
        text
    }
}

/// Block/trial counters and the append-only result logs of one run.
///
/// Both counters start at 1. The trial counter advances with every recorded
/// trial and resets at [`RunContext::close_block`]; the block counter only
/// ever grows.
#[derive(Debug, Clone)]
pub struct RunContext {
    block: u32,
    trial: u32,
    results: Vec<TrialResult>,
    reading: Vec<ReadingResult>,
    summaries: Vec<BlockSummary>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            block: 1,
            trial: 1,
            results: Vec::new(),
            reading: Vec::new(),
            summaries: Vec::new(),
        }
    }

    pub fn block(&self) -> u32 {
        self.block
    }

    pub fn trial(&self) -> u32 {
        self.trial
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn reading(&self) -> &[ReadingResult] {
        &self.reading
    }

    pub fn summaries(&self) -> &[BlockSummary] {
        &self.summaries
    }

    /// Appends a scored trial under the current counters and advances the
    /// trial counter.
    pub fn record(
        &mut self,
        spec: &TrialSpec,
        kind: BlockKind,
        observation: &Observation,
        outcome: Outcome,
        feedback_colour: Option<Colour>,
        timestamp_ns: u64,
    ) -> &TrialResult {
        self.results.push(TrialResult {
            block: self.block,
            trial: self.trial,
            block_kind: kind,
            condition: spec.condition.clone(),
            compatibility: spec.compatibility,
            stimulus: spec.describe(),
            expected: spec.expected,
            response: observation.response(),
            rt_ms: observation.rt_ms(),
            outcome,
            feedback_colour,
            timestamp_ns,
        });
        self.trial += 1;
        &self.results[self.results.len() - 1]
    }

    /// Logs one word of a reading trial under the current counters.
    pub fn record_word(&mut self, sentence: &str, read: WordRead) {
        self.reading.push(ReadingResult {
            block: self.block,
            trial: self.trial,
            sentence: sentence.to_string(),
            word_number: read.word_number,
            word: read.word,
            rt_ms: read.rt_ms,
        });
    }

    /// Ends a reading trial.
    pub fn finish_reading_trial(&mut self) {
        self.trial += 1;
    }

    pub fn current_summary(&self) -> BlockSummary {
        BlockSummary::from_results(&self.results, self.block)
    }

    /// Summarises the current block, then moves to the next one.
    pub fn close_block(&mut self) -> BlockSummary {
        let summary = self.current_summary();
        self.summaries.push(summary.clone());
        self.block += 1;
        self.trial = 1;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogtask_core::{Compatibility, Key, Response, StimulusType};
    use std::time::Duration;

    const D: Response = Response::Key(Key::Char('D'));
    const J: Response = Response::Key(Key::Char('J'));

    fn spec() -> TrialSpec {
        TrialSpec::single(
            StimulusType::Text {
                content: "<<<<<".into(),
            },
            "comp_left",
            Compatibility::Compatible,
            D,
        )
    }

    fn push(ctx: &mut RunContext, outcome: Outcome, ms: Option<u64>) {
        let obs = match ms {
            Some(ms) => Observation::Responded {
                response: if outcome.is_correct() { D } else { J },
                rt: Duration::from_millis(ms),
            },
            None => Observation::Timeout,
        };
        ctx.record(&spec(), BlockKind::Experimental, &obs, outcome, None, 0);
    }

    #[test]
    fn mean_rt_uses_correct_trials_only() {
        let mut ctx = RunContext::new();
        push(&mut ctx, Outcome::Correct, Some(400));
        push(&mut ctx, Outcome::Error, Some(900));
        push(&mut ctx, Outcome::Correct, Some(600));
        push(&mut ctx, Outcome::TooSlow, None);
        let s = ctx.current_summary();
        assert_eq!(s.n_trials, 4);
        assert_eq!(s.n_errors, 2);
        assert_eq!(s.mean_rt_ms, Some(500.0));
        assert_eq!(s.error_rate(), Some(50));
    }

    #[test]
    fn all_incorrect_block_reports_no_data() {
        let mut ctx = RunContext::new();
        push(&mut ctx, Outcome::Error, Some(500));
        push(&mut ctx, Outcome::TooFast, Some(50));
        let s = ctx.current_summary();
        assert_eq!(s.mean_rt_ms, None);
        assert_eq!(s.mean_rt_text(), NO_DATA);
        assert_eq!(s.error_rate(), Some(100));
        let text = s.render(3, &FeedbackConfig::default());
        assert!(text.contains("Mean RT: N/A"));
        assert!(!text.contains("NaN"));
        assert!(text.contains("Please respond more accurately!"));
    }

    #[test]
    fn empty_block_has_no_error_rate() {
        let s = BlockSummary::from_results(&[], 1);
        assert_eq!(s.error_rate(), None);
        assert_eq!(s.error_rate_text(), NO_DATA);
    }

    #[test]
    fn error_rate_rounds_to_nearest_percent() {
        let mut ctx = RunContext::new();
        push(&mut ctx, Outcome::Error, Some(500));
        push(&mut ctx, Outcome::Correct, Some(500));
        push(&mut ctx, Outcome::Correct, Some(500));
        // 1 / 3 = 33.3 %
        assert_eq!(ctx.current_summary().error_rate(), Some(33));
        push(&mut ctx, Outcome::Correct, Some(500));
        push(&mut ctx, Outcome::Correct, Some(500));
        push(&mut ctx, Outcome::Correct, Some(500));
        push(&mut ctx, Outcome::Correct, Some(500));
        push(&mut ctx, Outcome::Correct, Some(500));
        // 1 / 8 = 12.5 %
        assert_eq!(ctx.current_summary().error_rate(), Some(13));
    }

    #[test]
    fn counters_reset_per_block_and_grow_monotonically() {
        let mut ctx = RunContext::new();
        push(&mut ctx, Outcome::Correct, Some(500));
        push(&mut ctx, Outcome::Correct, Some(500));
        assert_eq!(ctx.trial(), 3);
        let first = ctx.close_block();
        assert_eq!(first.block, 1);
        assert_eq!((ctx.block(), ctx.trial()), (2, 1));
        push(&mut ctx, Outcome::Error, Some(500));
        ctx.close_block();
        assert_eq!(ctx.block(), 3);

        let keys: Vec<(u32, u32)> = ctx.results().iter().map(|r| (r.block, r.trial)).collect();
        assert_eq!(keys, vec![(1, 1), (1, 2), (2, 1)]);
        assert_eq!(ctx.summaries().len(), 2);
        assert_eq!(ctx.summaries()[1].n_errors, 1);
    }

    #[test]
    fn summary_filters_to_its_block() {
        let mut ctx = RunContext::new();
        push(&mut ctx, Outcome::Error, Some(500));
        ctx.close_block();
        push(&mut ctx, Outcome::Correct, Some(300));
        let s = ctx.current_summary();
        assert_eq!(s.block, 2);
        assert_eq!(s.n_trials, 1);
        assert_eq!(s.error_rate(), Some(0));
        assert_eq!(s.mean_rt_text(), "300 ms");
        assert!(s.render(2, &FeedbackConfig::default()).contains("Please respond faster!"));
    }

    #[test]
    fn recorded_trial_carries_timeout_sentinel() {
        let mut ctx = RunContext::new();
        let r = ctx.record(
            &spec(),
            BlockKind::Practice,
            &Observation::Timeout,
            Outcome::TooSlow,
            Some(Colour::RED),
            42,
        );
        assert_eq!(r.rt_ms, None);
        assert_eq!(r.response, None);
        assert_eq!(r.stimulus, "<<<<<");
        assert_eq!(r.block_kind, BlockKind::Practice);
    }
}
