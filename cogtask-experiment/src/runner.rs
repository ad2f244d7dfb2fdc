use crate::classify::Observation;
use cogtask_core::{FeedbackMode, Response, ResponseSet, StimulusType, TrialSpec, TrialState};
use std::time::Duration;

const NS_PER_MS: u64 = 1_000_000;

/// Saturates instead of overflowing for absurd configured durations.
pub(crate) fn after_ms(start_ns: u64, ms: u64) -> u64 {
    start_ns.saturating_add(ms.saturating_mul(NS_PER_MS))
}

/// Everything one trial needs from the run list.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialPlan {
    pub spec: TrialSpec,
    pub fixation_ms: u64,
    pub response_window_ms: u64,
    pub feedback: FeedbackMode,
    pub feedback_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    /// Fixation is over; the first stimulus stage is on screen.
    StimulusOnset,
    /// A later stage of a staged display became visible.
    StageShown(usize),
    ResponseWindowOpen,
    Scored(Observation),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDisposition {
    Accepted,
    Ignored,
}

/// Time-driven state machine for a single trial:
/// `AwaitingStimulusOnset -> Displaying -> AwaitingResponse -> Scored -> Done`.
///
/// Time only moves when [`TrialRunner::tick`] is called; transitions are
/// stamped with their scheduled deadline rather than the tick time, so a late
/// tick does not stretch the following phases.
#[derive(Debug, Clone)]
pub struct TrialRunner {
    plan: TrialPlan,
    state: TrialState,
    started_ns: u64,
    onset_ns: Option<u64>,
    stage: usize,
    observation: Option<Observation>,
    scored_ns: Option<u64>,
    done_ns: Option<u64>,
}

impl TrialRunner {
    pub fn new(plan: TrialPlan, started_ns: u64) -> Self {
        Self {
            plan,
            state: TrialState::AwaitingStimulusOnset,
            started_ns,
            onset_ns: None,
            stage: 0,
            observation: None,
            scored_ns: None,
            done_ns: None,
        }
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn plan(&self) -> &TrialPlan {
        &self.plan
    }

    pub fn spec(&self) -> &TrialSpec {
        &self.plan.spec
    }

    pub fn observation(&self) -> Option<&Observation> {
        self.observation.as_ref()
    }

    pub fn onset_ns(&self) -> Option<u64> {
        self.onset_ns
    }

    pub fn scored_ns(&self) -> Option<u64> {
        self.scored_ns
    }

    pub fn done_ns(&self) -> Option<u64> {
        self.done_ns
    }

    /// Stimulus stage currently on screen, if the display has started.
    pub fn visible_stimulus(&self) -> Option<&StimulusType> {
        match self.state {
            TrialState::Displaying | TrialState::AwaitingResponse => {
                Some(&self.plan.spec.stages[self.stage].stimulus)
            }
            _ => None,
        }
    }

    fn deadline_ns(&self) -> Option<u64> {
        self.onset_ns
            .map(|onset| after_ms(onset, self.plan.response_window_ms))
    }

    fn check_timeout(&mut self, now_ns: u64, events: &mut Vec<RunnerEvent>) -> bool {
        match self.deadline_ns() {
            Some(deadline) if now_ns >= deadline => {
                self.observation = Some(Observation::Timeout);
                self.scored_ns = Some(deadline);
                self.state = TrialState::Scored;
                events.push(RunnerEvent::Scored(Observation::Timeout));
                true
            }
            _ => false,
        }
    }

    /// Applies every transition that is due at `now_ns`.
    pub fn tick(&mut self, now_ns: u64) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        loop {
            match self.state {
                TrialState::AwaitingStimulusOnset => {
                    let onset = after_ms(self.started_ns, self.plan.fixation_ms);
                    if now_ns < onset {
                        break;
                    }
                    self.onset_ns = Some(onset);
                    self.stage = 0;
                    self.state = TrialState::Displaying;
                    events.push(RunnerEvent::StimulusOnset);
                }
                TrialState::Displaying => {
                    if self.check_timeout(now_ns, &mut events) {
                        continue;
                    }
                    let onset = self.onset_ns.unwrap_or(now_ns);
                    let elapsed_ms = now_ns.saturating_sub(onset) / NS_PER_MS;
                    let idx = self.plan.spec.stage_index_at(elapsed_ms);
                    if idx > self.stage {
                        self.stage = idx;
                        events.push(RunnerEvent::StageShown(idx));
                    }
                    if elapsed_ms < self.plan.spec.last_onset_ms() {
                        break;
                    }
                    self.state = TrialState::AwaitingResponse;
                    events.push(RunnerEvent::ResponseWindowOpen);
                }
                TrialState::AwaitingResponse => {
                    if !self.check_timeout(now_ns, &mut events) {
                        break;
                    }
                }
                TrialState::Scored => {
                    let scored = self.scored_ns.unwrap_or(now_ns);
                    let end = after_ms(scored, self.plan.feedback_ms);
                    if now_ns < end {
                        break;
                    }
                    self.done_ns = Some(end);
                    self.state = TrialState::Done;
                    events.push(RunnerEvent::Done);
                }
                TrialState::Done => break,
            }
        }
        events
    }

    /// Offers an input to the trial. Only the first allowed input while the
    /// stimulus is up counts; the caller ticks first so a late input cannot
    /// beat an expired window.
    pub fn respond(
        &mut self,
        response: Response,
        allowed: &ResponseSet,
        now_ns: u64,
    ) -> InputDisposition {
        if !matches!(
            self.state,
            TrialState::Displaying | TrialState::AwaitingResponse
        ) || !allowed.contains(&response)
        {
            return InputDisposition::Ignored;
        }
        let (Some(onset), Some(deadline)) = (self.onset_ns, self.deadline_ns()) else {
            return InputDisposition::Ignored;
        };
        if now_ns >= deadline {
            return InputDisposition::Ignored;
        }
        self.observation = Some(Observation::Responded {
            response,
            rt: Duration::from_nanos(now_ns.saturating_sub(onset)),
        });
        self.scored_ns = Some(now_ns);
        self.state = TrialState::Scored;
        InputDisposition::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogtask_core::{Compatibility, Key, StimulusStage};

    const MS: u64 = NS_PER_MS;
    const D: Response = Response::Key(Key::Char('D'));
    const J: Response = Response::Key(Key::Char('J'));

    fn allowed() -> ResponseSet {
        ResponseSet::new([D, J])
    }

    fn plan(stages: Vec<StimulusStage>) -> TrialPlan {
        TrialPlan {
            spec: TrialSpec::staged(stages, "comp", Compatibility::Compatible, D),
            fixation_ms: 500,
            response_window_ms: 1500,
            feedback: FeedbackMode::Full,
            feedback_ms: 300,
        }
    }

    fn text(s: &str) -> StimulusType {
        StimulusType::Text { content: s.into() }
    }

    fn single() -> TrialPlan {
        plan(vec![StimulusStage::immediate(text("<<<<<"))])
    }

    #[test]
    fn walks_all_states_on_response() {
        let mut r = TrialRunner::new(single(), 0);
        assert_eq!(r.state(), TrialState::AwaitingStimulusOnset);
        assert!(r.tick(499 * MS).is_empty());

        let ev = r.tick(500 * MS);
        assert_eq!(ev, vec![RunnerEvent::StimulusOnset, RunnerEvent::ResponseWindowOpen]);
        assert_eq!(r.state(), TrialState::AwaitingResponse);
        assert_eq!(r.visible_stimulus(), Some(&text("<<<<<")));

        assert_eq!(r.respond(D, &allowed(), 900 * MS), InputDisposition::Accepted);
        assert_eq!(r.state(), TrialState::Scored);
        assert_eq!(r.observation().and_then(|o| o.rt_ms()), Some(400.0));

        assert!(r.tick(1199 * MS).is_empty());
        assert_eq!(r.tick(1200 * MS), vec![RunnerEvent::Done]);
        assert_eq!(r.done_ns(), Some(1200 * MS));
        assert_eq!(r.state(), TrialState::Done);
    }

    #[test]
    fn only_first_response_counts() {
        let mut r = TrialRunner::new(single(), 0);
        r.tick(500 * MS);
        assert_eq!(r.respond(J, &allowed(), 800 * MS), InputDisposition::Accepted);
        assert_eq!(r.respond(D, &allowed(), 850 * MS), InputDisposition::Ignored);
        assert_eq!(r.observation().and_then(|o| o.response()), Some(J));
    }

    #[test]
    fn ignores_input_during_fixation_and_outside_allow_list() {
        let mut r = TrialRunner::new(single(), 0);
        assert_eq!(r.respond(D, &allowed(), 100 * MS), InputDisposition::Ignored);
        r.tick(500 * MS);
        let other = Response::Key(Key::Char('Q'));
        assert_eq!(r.respond(other, &allowed(), 600 * MS), InputDisposition::Ignored);
        assert_eq!(r.state(), TrialState::AwaitingResponse);
    }

    #[test]
    fn times_out_at_window_end() {
        let mut r = TrialRunner::new(single(), 0);
        r.tick(500 * MS);
        assert!(r.tick(1999 * MS).is_empty());
        let ev = r.tick(2000 * MS);
        assert_eq!(ev, vec![RunnerEvent::Scored(Observation::Timeout)]);
        assert_eq!(r.scored_ns(), Some(2000 * MS));
        assert_eq!(r.respond(D, &allowed(), 2001 * MS), InputDisposition::Ignored);
    }

    #[test]
    fn huge_durations_saturate_instead_of_overflowing() {
        let mut p = single();
        p.response_window_ms = u64::MAX / 1_000;
        p.feedback_ms = u64::MAX;
        let mut r = TrialRunner::new(p, 0);
        r.tick(500 * MS);
        assert_eq!(r.state(), TrialState::AwaitingResponse);
        assert!(r.tick(u64::MAX - 1).is_empty());
        assert_eq!(r.respond(D, &allowed(), 900 * MS), InputDisposition::Accepted);
        assert!(r.tick(u64::MAX - 1).is_empty());
        assert_eq!(r.tick(u64::MAX), vec![RunnerEvent::Done]);

        let mut late = single();
        late.fixation_ms = u64::MAX;
        let mut r = TrialRunner::new(late, 10 * MS);
        assert!(r.tick(u64::MAX - 1).is_empty());
        assert_eq!(r.state(), TrialState::AwaitingStimulusOnset);
    }

    #[test]
    fn late_tick_chains_through_to_done() {
        let mut r = TrialRunner::new(single(), 0);
        let ev = r.tick(10_000 * MS);
        assert_eq!(
            ev,
            vec![
                RunnerEvent::StimulusOnset,
                RunnerEvent::Scored(Observation::Timeout),
                RunnerEvent::Done
            ]
        );
        // Feedback ends 300 ms after the scheduled deadline, not after the tick.
        assert_eq!(r.done_ns(), Some(2300 * MS));
    }

    #[test]
    fn staged_display_reveals_target_after_onset() {
        let mut r = TrialRunner::new(
            plan(vec![
                StimulusStage::immediate(text("AA AA")),
                StimulusStage {
                    onset_ms: 100,
                    stimulus: text("AAEAA"),
                },
            ]),
            0,
        );
        assert_eq!(r.tick(500 * MS), vec![RunnerEvent::StimulusOnset]);
        assert_eq!(r.state(), TrialState::Displaying);
        assert_eq!(r.visible_stimulus(), Some(&text("AA AA")));

        let ev = r.tick(600 * MS);
        assert_eq!(ev, vec![RunnerEvent::StageShown(1), RunnerEvent::ResponseWindowOpen]);
        assert_eq!(r.visible_stimulus(), Some(&text("AAEAA")));
    }

    #[test]
    fn response_during_staged_display_is_scored() {
        let mut r = TrialRunner::new(
            plan(vec![
                StimulusStage::immediate(text("AA AA")),
                StimulusStage {
                    onset_ms: 100,
                    stimulus: text("AAEAA"),
                },
            ]),
            0,
        );
        r.tick(500 * MS);
        assert_eq!(r.respond(D, &allowed(), 550 * MS), InputDisposition::Accepted);
        assert_eq!(r.observation().and_then(|o| o.rt_ms()), Some(50.0));
    }
}
