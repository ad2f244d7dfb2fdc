use crate::config::{OutputFormat, ResponseMapping};
use crate::participant::Participant;
use crate::reading::ReadingResult;
use chrono::{DateTime, Utc};
use cogtask_core::TrialResult;
use serde::Serialize;

/// Everything a finished (or aborted) run hands to its sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunData {
    pub experiment_name: String,
    pub participant: Participant,
    pub started_at: DateTime<Utc>,
    pub resp_mapping: u8,
    pub format: OutputFormat,
    pub completion_code: String,
    pub results: Vec<TrialResult>,
    pub reading: Vec<ReadingResult>,
    pub aborted: bool,
}

impl RunData {
    pub fn new(
        experiment_name: impl Into<String>,
        participant: Participant,
        started_at: DateTime<Utc>,
        mapping: &ResponseMapping,
        format: OutputFormat,
        completion_code: impl Into<String>,
    ) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            participant,
            started_at,
            resp_mapping: mapping.mapping,
            format,
            completion_code: completion_code.into(),
            results: Vec::new(),
            reading: Vec::new(),
            aborted: false,
        }
    }

    /// `<experiment>_<participant>` without extension.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.experiment_name, self.participant.id)
    }
}

/// Where a run's data goes. Saving is fire-and-forget: a sink deals with
/// its own failures and never stalls the session.
pub trait DataSink {
    fn save(&mut self, data: &RunData);

    /// Sends the completion code on its own, if the sink supports it.
    fn submit_code(&mut self, _experiment_name: &str, _code: &str) {}
}

impl<S: DataSink + ?Sized> DataSink for Box<S> {
    fn save(&mut self, data: &RunData) {
        (**self).save(data)
    }

    fn submit_code(&mut self, experiment_name: &str, code: &str) {
        (**self).submit_code(experiment_name, code)
    }
}

/// Fans a save out to several sinks in order.
impl<S: DataSink> DataSink for Vec<S> {
    fn save(&mut self, data: &RunData) {
        for sink in self.iter_mut() {
            sink.save(data);
        }
    }

    fn submit_code(&mut self, experiment_name: &str, code: &str) {
        for sink in self.iter_mut() {
            sink.submit_code(experiment_name, code);
        }
    }
}

/// Keeps saved runs in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub saved: Vec<RunData>,
    pub codes: Vec<(String, String)>,
}

impl MemorySink {
    pub fn saves(&self) -> usize {
        self.saved.len()
    }

    pub fn last(&self) -> Option<&RunData> {
        self.saved.last()
    }
}

impl DataSink for MemorySink {
    fn save(&mut self, data: &RunData) {
        self.saved.push(data.clone());
    }

    fn submit_code(&mut self, experiment_name: &str, code: &str) {
        self.codes.push((experiment_name.to_string(), code.to_string()));
    }
}
