use crate::aggregate::{BlockSummary, RunContext};
use crate::classify::{Observation, classify};
use crate::config::{ResponseMapping, RunConfig};
use crate::display::{Display, Screen};
use crate::error::ConfigError;
use crate::participant::{COMPLETION_CODE_LEN, Participant, completion_code};
use crate::reading::MovingWindow;
use crate::runner::{InputDisposition, RunnerEvent, TrialRunner, after_ms};
use crate::sequence::{RunList, Step, build_run_list};
use crate::sink::{DataSink, RunData};
use crate::stimuli::Templates;
use chrono::{DateTime, Utc};
use cogtask_core::{BlockKind, FeedbackMode, Outcome, Response, ResponseSet, TrialState};
use cogtask_timing::Timer;
use rand::Rng;
use tracing::{debug, info, warn};

/// Everything decided once before the first screen: validated config,
/// key mapping, run list and completion code.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub config: RunConfig,
    pub participant: Participant,
    pub mapping: ResponseMapping,
    pub allowed: ResponseSet,
    pub run_list: RunList,
    pub completion_code: String,
}

impl RunPlan {
    pub fn prepare<R: Rng + ?Sized>(
        config: RunConfig,
        participant: Participant,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mapping = config.responses.mapping(rng);
        let templates = Templates::build(&config, &mapping, rng)?;
        let run_list = build_run_list(&config, &templates, rng)?;
        let allowed = config.allowed_responses(&mapping);
        let completion_code = completion_code(rng, COMPLETION_CODE_LEN);
        info!(
            experiment = %config.experiment_name,
            participant = %participant.id,
            resp_mapping = mapping.mapping,
            templates = templates.len(),
            steps = run_list.len(),
            "run prepared"
        );
        Ok(Self {
            config,
            participant,
            mapping,
            allowed,
            run_list,
            completion_code,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    NotStarted,
    Running,
    Finished,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StepStarted(usize),
    TrialScored {
        block: u32,
        trial: u32,
        outcome: Outcome,
    },
    BlockCompleted(BlockSummary),
    Saved,
    Finished,
    Aborted,
}

#[derive(Debug)]
enum Active {
    Idle,
    /// Message or block summary on screen.
    WaitingForKey,
    Trial(TrialRunner),
    Reading(MovingWindow),
    Interval { until_ns: u64 },
}

/// Walks a run list one step at a time.
///
/// Timed steps advance on [`Session::update`]; key-driven ones on
/// [`Session::handle_input`], which updates first so an input never lands
/// in a phase that has already expired. Every timed step starts at the
/// scheduled end of the one before it.
pub struct Session<T, R, D, S>
where
    T: Timer,
    R: Rng,
    D: Display,
    S: DataSink,
{
    plan: RunPlan,
    timer: T,
    rng: R,
    display: D,
    sink: S,
    context: RunContext,
    started_at: DateTime<Utc>,
    cursor: usize,
    active: Active,
    block_kind: BlockKind,
    previous_stimulus: Option<String>,
    saved: bool,
    status: SessionStatus,
}

impl<T, R, D, S> Session<T, R, D, S>
where
    T: Timer,
    R: Rng,
    D: Display,
    S: DataSink,
{
    pub fn new(plan: RunPlan, timer: T, rng: R, display: D, sink: S) -> Self {
        Self {
            plan,
            timer,
            rng,
            display,
            sink,
            context: RunContext::new(),
            started_at: Utc::now(),
            cursor: 0,
            active: Active::Idle,
            block_kind: BlockKind::default(),
            previous_stimulus: None,
            saved: false,
            status: SessionStatus::NotStarted,
        }
    }

    pub fn start(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.status != SessionStatus::NotStarted {
            return events;
        }
        self.started_at = Utc::now();
        self.status = SessionStatus::Running;
        info!(steps = self.plan.run_list.len(), "session started");
        let now = self.timer.now();
        self.enter_step(now, &mut events);
        events
    }

    /// Applies every timed transition due by now.
    pub fn update(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let now = self.timer.now();
        self.advance(now, &mut events);
        events
    }

    pub fn handle_input(&mut self, input: Response) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let now = self.timer.now();
        self.advance(now, &mut events);
        if self.status != SessionStatus::Running {
            return events;
        }
        if input == Response::Key(self.plan.config.responses.abort) {
            self.abort_at(&mut events);
            return events;
        }

        let mut step_done = false;
        match &mut self.active {
            Active::WaitingForKey => step_done = true,
            Active::Trial(runner) => {
                match runner.respond(input, &self.plan.allowed, now) {
                    InputDisposition::Accepted => {
                        if let Some(observation) = runner.observation().copied() {
                            self.score(observation, now, &mut events);
                        }
                    }
                    InputDisposition::Ignored => {
                        debug!(%input, state = ?runner.state(), "input ignored");
                    }
                }
            }
            Active::Reading(window) => {
                if input == self.plan.config.reading.advance {
                    if let Some(read) = window.advance(now) {
                        self.context.record_word(window.sentence(), read);
                    }
                    if window.is_finished() {
                        self.context.finish_reading_trial();
                        step_done = true;
                    } else {
                        self.display.show(Screen::Reading(&window.frame()));
                    }
                }
            }
            Active::Interval { .. } | Active::Idle => {}
        }
        if step_done {
            self.cursor += 1;
            self.enter_step(now, &mut events);
        }
        events
    }

    /// Ends the run from whatever state it is in and saves what was
    /// collected so far. The trial in progress is discarded.
    pub fn abort(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.status == SessionStatus::Running {
            self.abort_at(&mut events);
        }
        events
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_over(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Finished | SessionStatus::Aborted
        )
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Index of the run-list step currently on screen.
    pub fn step_index(&self) -> usize {
        match &self.active {
            Active::Trial(runner) => {
                self.cursor
                    + match runner.state() {
                        TrialState::AwaitingStimulusOnset => 0,
                        TrialState::Displaying | TrialState::AwaitingResponse => 1,
                        TrialState::Scored => 2,
                        TrialState::Done => 3,
                    }
            }
            _ => self.cursor,
        }
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.plan.run_list.get(self.step_index())
    }

    pub fn current_trial(&self) -> Option<&TrialRunner> {
        match &self.active {
            Active::Trial(runner) => Some(runner),
            _ => None,
        }
    }

    pub fn trial_state(&self) -> Option<TrialState> {
        self.current_trial().map(TrialRunner::state)
    }

    pub fn reading_window(&self) -> Option<&MovingWindow> {
        match &self.active {
            Active::Reading(window) => Some(window),
            _ => None,
        }
    }

    fn advance(&mut self, now_ns: u64, events: &mut Vec<SessionEvent>) {
        while self.status == SessionStatus::Running {
            match &mut self.active {
                Active::Trial(runner) => {
                    for event in runner.tick(now_ns) {
                        match event {
                            RunnerEvent::StimulusOnset | RunnerEvent::StageShown(_) => {
                                self.show_stimulus()
                            }
                            RunnerEvent::Scored(observation) => {
                                let at = self
                                    .current_trial()
                                    .and_then(TrialRunner::scored_ns)
                                    .unwrap_or(now_ns);
                                self.score(observation, at, events);
                            }
                            RunnerEvent::ResponseWindowOpen | RunnerEvent::Done => {}
                        }
                    }
                    match self.current_trial().and_then(TrialRunner::done_ns) {
                        Some(done_ns) => {
                            // Fixation, stimulus, feedback: resume at the interval.
                            self.cursor += 3;
                            self.enter_step(done_ns, events);
                        }
                        None => break,
                    }
                }
                Active::Interval { until_ns } => {
                    let until = *until_ns;
                    if now_ns < until {
                        break;
                    }
                    self.cursor += 1;
                    self.enter_step(until, events);
                }
                _ => break,
            }
        }
    }

    /// Starts the step under the cursor at `at_ns`, running through
    /// zero-length steps until one needs time or input.
    fn enter_step(&mut self, at_ns: u64, events: &mut Vec<SessionEvent>) {
        loop {
            let Some(step) = self.plan.run_list.get(self.cursor) else {
                self.finish(events);
                return;
            };
            events.push(SessionEvent::StepStarted(self.cursor));
            match step {
                Step::Message(text) => {
                    let text = text.replace("{code}", &self.plan.completion_code);
                    self.display.show(Screen::Message(&text));
                    self.active = Active::WaitingForKey;
                    return;
                }
                Step::BlockStart { block, kind, .. } => {
                    debug!(block, kind = %kind, "block started");
                    self.block_kind = *kind;
                    self.previous_stimulus = None;
                }
                Step::Fixation { .. } => match self.plan.run_list.trial_plan(self.cursor) {
                    Some(plan) => {
                        self.display.show(Screen::Fixation);
                        self.active = Active::Trial(TrialRunner::new(plan, at_ns));
                        return;
                    }
                    None => warn!(step = self.cursor, "fixation without a trial, skipped"),
                },
                Step::Stimulus { .. } | Step::Feedback { .. } => {
                    warn!(step = self.cursor, "trial step outside a trial, skipped");
                }
                Step::Interval { duration_ms } => {
                    self.display.show(Screen::Blank);
                    self.active = Active::Interval {
                        until_ns: after_ms(at_ns, *duration_ms),
                    };
                    return;
                }
                Step::Reading { sentence } => {
                    let window = MovingWindow::new(sentence, &self.plan.config.reading, at_ns);
                    self.display.show(Screen::Reading(&window.frame()));
                    self.active = Active::Reading(window);
                    return;
                }
                Step::BlockSummary { .. } => {
                    let summary = self.context.close_block();
                    let text = summary.render(
                        self.plan.run_list.total_blocks(),
                        &self.plan.config.feedback,
                    );
                    info!(
                        block = summary.block,
                        trials = summary.n_trials,
                        errors = summary.n_errors,
                        mean_rt = %summary.mean_rt_text(),
                        "block completed"
                    );
                    self.display.show(Screen::Message(&text));
                    events.push(SessionEvent::BlockCompleted(summary));
                    self.active = Active::WaitingForKey;
                    return;
                }
                Step::Save => self.save(false, events),
            }
            self.cursor += 1;
        }
    }

    fn show_stimulus(&mut self) {
        if let Active::Trial(runner) = &self.active {
            if let Some(stimulus) = runner.visible_stimulus() {
                self.display.show(Screen::Stimulus(stimulus));
            }
        }
    }

    fn score(&mut self, observation: Observation, at_ns: u64, events: &mut Vec<SessionEvent>) {
        let Active::Trial(runner) = &self.active else {
            return;
        };
        let spec = runner.spec();
        let feedback = &self.plan.config.feedback;
        let outcome = classify(&observation, &spec.expected, &self.plan.config.thresholds);
        let stimulus = spec.describe();

        let colour = match runner.plan().feedback {
            FeedbackMode::Full => {
                let swap = self.block_kind == BlockKind::Experimental
                    && outcome.is_correct()
                    && feedback.false_feedback_rate > 0.0
                    && self.previous_stimulus.as_deref() != Some(stimulus.as_str())
                    && self.rng.random_bool(feedback.false_feedback_rate);
                Some(if swap {
                    feedback.false_colour
                } else {
                    feedback.colour_for(outcome)
                })
            }
            FeedbackMode::Blank => None,
        };

        let result = self
            .context
            .record(spec, self.block_kind, &observation, outcome, colour, at_ns);
        debug!(
            block = result.block,
            trial = result.trial,
            condition = %result.condition,
            rt_ms = ?result.rt_ms,
            %outcome,
            "trial scored"
        );
        events.push(SessionEvent::TrialScored {
            block: result.block,
            trial: result.trial,
            outcome,
        });

        match colour {
            Some(colour) => self.display.show(Screen::Feedback {
                outcome,
                text: feedback.text_for(outcome),
                colour,
            }),
            None => self.display.show(Screen::Blank),
        }
        self.previous_stimulus = Some(stimulus);
    }

    fn save(&mut self, aborted: bool, events: &mut Vec<SessionEvent>) {
        if self.saved {
            return;
        }
        self.saved = true;
        let config = &self.plan.config;
        let mut data = RunData::new(
            &config.experiment_name,
            self.plan.participant.clone(),
            self.started_at,
            &self.plan.mapping,
            config.output.format,
            &self.plan.completion_code,
        );
        data.results = self.context.results().to_vec();
        data.reading = self.context.reading().to_vec();
        data.aborted = aborted;

        self.sink.save(&data);
        if !aborted {
            self.sink
                .submit_code(&config.experiment_name, &self.plan.completion_code);
        }
        info!(
            trials = data.results.len(),
            words = data.reading.len(),
            aborted,
            "run data saved"
        );
        events.push(SessionEvent::Saved);
    }

    fn finish(&mut self, events: &mut Vec<SessionEvent>) {
        self.save(false, events);
        self.active = Active::Idle;
        self.status = SessionStatus::Finished;
        info!("session finished");
        events.push(SessionEvent::Finished);
    }

    fn abort_at(&mut self, events: &mut Vec<SessionEvent>) {
        warn!(
            step = self.step_index(),
            block = self.context.block(),
            trial = self.context.trial(),
            "run aborted"
        );
        self.active = Active::Idle;
        self.save(true, events);
        self.display.show(Screen::Blank);
        self.status = SessionStatus::Aborted;
        events.push(SessionEvent::Aborted);
    }
}
