use crate::reading::ReadingFrame;
use cogtask_core::{Colour, Outcome, Stimulus, StimulusType};

/// What the participant should be looking at right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Screen<'a> {
    Blank,
    Fixation,
    Stimulus(&'a StimulusType),
    Feedback {
        outcome: Outcome,
        text: &'a str,
        colour: Colour,
    },
    /// Instructions, block summaries and the debrief.
    Message(&'a str),
    Reading(&'a ReadingFrame),
}

/// Presentation seam. The session decides what to show; implementors
/// decide how (pixels, terminal, nothing at all).
pub trait Display {
    fn show(&mut self, screen: Screen<'_>);
}

impl<D: Display + ?Sized> Display for Box<D> {
    fn show(&mut self, screen: Screen<'_>) {
        (**self).show(screen)
    }
}

/// Shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show(&mut self, _screen: Screen<'_>) {}
}

/// Owned copy of a [`Screen`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenShot {
    Blank,
    Fixation,
    Stimulus(String),
    Feedback {
        outcome: Outcome,
        text: String,
        colour: Colour,
    },
    Message(String),
    Reading(Vec<String>),
}

impl From<Screen<'_>> for ScreenShot {
    fn from(screen: Screen<'_>) -> Self {
        match screen {
            Screen::Blank => ScreenShot::Blank,
            Screen::Fixation => ScreenShot::Fixation,
            Screen::Stimulus(s) => ScreenShot::Stimulus(s.describe()),
            Screen::Feedback {
                outcome,
                text,
                colour,
            } => ScreenShot::Feedback {
                outcome,
                text: text.to_string(),
                colour,
            },
            Screen::Message(text) => ScreenShot::Message(text.to_string()),
            Screen::Reading(frame) => {
                ScreenShot::Reading(frame.lines.iter().map(|l| l.text.clone()).collect())
            }
        }
    }
}

/// Keeps every screen it is asked to show; used for headless runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay {
    pub shown: Vec<ScreenShot>,
}

impl RecordingDisplay {
    pub fn last(&self) -> Option<&ScreenShot> {
        self.shown.last()
    }
}

impl Display for RecordingDisplay {
    fn show(&mut self, screen: Screen<'_>) {
        self.shown.push(screen.into());
    }
}
