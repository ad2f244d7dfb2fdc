use cogtask_core::TrialResult;
use cogtask_experiment::{OutputFormat, ReadingResult, RunData};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::ExportError;

/// Fixed trial columns, in output order. Participant properties follow.
pub const TRIAL_COLUMNS: [&str; 17] = [
    "experiment",
    "participant",
    "date",
    "resp_mapping",
    "block",
    "trial",
    "kind",
    "condition",
    "compatibility",
    "stimulus",
    "expected",
    "response",
    "rt",
    "outcome",
    "outcome_label",
    "feedback_colour",
    "timestamp_ns",
];

pub const READING_COLUMNS: [&str; 9] = [
    "experiment",
    "participant",
    "date",
    "block",
    "trial",
    "sentence",
    "word_number",
    "word",
    "rt",
];

/// One exported trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub experiment: String,
    pub participant: String,
    pub date: String,
    pub resp_mapping: u8,
    pub block: u32,
    pub trial: u32,
    pub kind: String,
    pub condition: String,
    pub compatibility: String,
    pub stimulus: String,
    pub expected: String,
    pub response: Option<String>,
    pub rt: Option<f64>,
    pub outcome: u8,
    pub outcome_label: String,
    pub feedback_colour: Option<String>,
    pub timestamp_ns: u64,
    #[serde(flatten)]
    pub properties: BTreeMap<String, String>,
}

impl OutputRow {
    pub fn new(data: &RunData, result: &TrialResult) -> Self {
        Self {
            experiment: data.experiment_name.clone(),
            participant: data.participant.id.clone(),
            date: date(data),
            resp_mapping: data.resp_mapping,
            block: result.block,
            trial: result.trial,
            kind: result.block_kind.to_string(),
            condition: result.condition.clone(),
            compatibility: result.compatibility.to_string(),
            stimulus: result.stimulus.clone(),
            expected: result.expected.to_string(),
            response: result.response.map(|r| r.to_string()),
            rt: result.rt_ms,
            outcome: result.outcome.code(),
            outcome_label: result.outcome.to_string(),
            feedback_colour: result.feedback_colour.map(|c| c.name()),
            timestamp_ns: result.timestamp_ns,
            properties: properties(data, &TRIAL_COLUMNS),
        }
    }

    fn record(&self) -> Vec<String> {
        let mut record = vec![
            self.experiment.clone(),
            self.participant.clone(),
            self.date.clone(),
            self.resp_mapping.to_string(),
            self.block.to_string(),
            self.trial.to_string(),
            self.kind.clone(),
            self.condition.clone(),
            self.compatibility.clone(),
            self.stimulus.clone(),
            self.expected.clone(),
            self.response.clone().unwrap_or_default(),
            self.rt.map(|rt| rt.to_string()).unwrap_or_default(),
            self.outcome.to_string(),
            self.outcome_label.clone(),
            self.feedback_colour.clone().unwrap_or_default(),
            self.timestamp_ns.to_string(),
        ];
        record.extend(self.properties.values().cloned());
        record
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingRow {
    pub experiment: String,
    pub participant: String,
    pub date: String,
    pub block: u32,
    pub trial: u32,
    pub sentence: String,
    pub word_number: usize,
    pub word: String,
    pub rt: f64,
    #[serde(flatten)]
    pub properties: BTreeMap<String, String>,
}

impl ReadingRow {
    pub fn new(data: &RunData, result: &ReadingResult) -> Self {
        Self {
            experiment: data.experiment_name.clone(),
            participant: data.participant.id.clone(),
            date: date(data),
            block: result.block,
            trial: result.trial,
            sentence: result.sentence.clone(),
            word_number: result.word_number,
            word: result.word.clone(),
            rt: result.rt_ms,
            properties: properties(data, &READING_COLUMNS),
        }
    }

    fn record(&self) -> Vec<String> {
        let mut record = vec![
            self.experiment.clone(),
            self.participant.clone(),
            self.date.clone(),
            self.block.to_string(),
            self.trial.to_string(),
            self.sentence.clone(),
            self.word_number.to_string(),
            self.word.clone(),
            self.rt.to_string(),
        ];
        record.extend(self.properties.values().cloned());
        record
    }
}

fn date(data: &RunData) -> String {
    data.started_at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Participant properties minus any that would shadow one of `columns`.
fn properties(data: &RunData, columns: &[&str]) -> BTreeMap<String, String> {
    data.participant
        .properties
        .iter()
        .filter(|(k, _)| !columns.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// A serialised file: name plus contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub filename: String,
    pub body: String,
}

/// `<experiment>_<participant>.<ext>`, plus
/// `<experiment>_<participant>_reading.<ext>` when words were read.
pub fn payloads(data: &RunData) -> Result<Vec<Payload>, ExportError> {
    let ext = data.format.extension();
    let stem = data.file_stem();
    let mut out = Vec::with_capacity(2);

    if !data.results.is_empty() || data.reading.is_empty() {
        let rows: Vec<OutputRow> = data.results.iter().map(|r| OutputRow::new(data, r)).collect();
        out.push(Payload {
            filename: format!("{stem}.{ext}"),
            body: encode(data, &TRIAL_COLUMNS, &rows, OutputRow::record)?,
        });
    }
    if !data.reading.is_empty() {
        let rows: Vec<ReadingRow> = data.reading.iter().map(|r| ReadingRow::new(data, r)).collect();
        out.push(Payload {
            filename: format!("{stem}_reading.{ext}"),
            body: encode(data, &READING_COLUMNS, &rows, ReadingRow::record)?,
        });
    }
    Ok(out)
}

fn encode<T: Serialize>(
    data: &RunData,
    columns: &[&str],
    rows: &[T],
    record: fn(&T) -> Vec<String>,
) -> Result<String, ExportError> {
    match data.format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(rows)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            let mut header: Vec<&str> = columns.to_vec();
            header.extend(properties_keys(data, columns));
            writer.write_record(&header)?;
            for row in rows {
                writer.write_record(record(row))?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| ExportError::CsvFlush(e.into_error()))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn properties_keys<'a>(data: &'a RunData, columns: &'a [&str]) -> impl Iterator<Item = &'a str> {
    data.participant
        .properties
        .keys()
        .map(String::as_str)
        .filter(move |k| !columns.contains(k))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cogtask_core::{BlockKind, Colour, Compatibility, Key, Outcome, Response};
    use cogtask_experiment::{Participant, ResponseMapping};

    pub(crate) fn run_data(format: OutputFormat) -> RunData {
        let participant = Participant::new("p01")
            .with_property("age", "29")
            .with_property("handedness", "right");
        let mapping = ResponseMapping {
            mapping: 2,
            keys: vec![],
        };
        let started = Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap();
        let mut data = RunData::new("flanker", participant, started, &mapping, format, "ABC123");
        let d = Response::Key(Key::Char('D'));
        let j = Response::Key(Key::Char('J'));
        data.results = vec![
            TrialResult {
                block: 1,
                trial: 1,
                block_kind: BlockKind::Practice,
                condition: "incomp_left".into(),
                compatibility: Compatibility::Incompatible,
                stimulus: ">><>>".into(),
                expected: d,
                response: Some(d),
                rt_ms: Some(412.5),
                outcome: Outcome::Correct,
                feedback_colour: Some(Colour::GREEN),
                timestamp_ns: 1_000,
            },
            TrialResult {
                block: 1,
                trial: 2,
                block_kind: BlockKind::Practice,
                condition: "comp_right".into(),
                compatibility: Compatibility::Compatible,
                stimulus: ">>>>>".into(),
                expected: j,
                response: None,
                rt_ms: None,
                outcome: Outcome::TooSlow,
                feedback_colour: Some(Colour::RED),
                timestamp_ns: 2_000,
            },
        ];
        data
    }

    #[test]
    fn csv_has_fixed_columns_then_properties() {
        let files = payloads(&run_data(OutputFormat::Csv)).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "flanker_p01.csv");

        let mut lines = files[0].body.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("experiment,participant,date,resp_mapping,block,trial"));
        assert!(header.ends_with("timestamp_ns,age,handedness"));
        assert_eq!(
            lines.next().unwrap(),
            "flanker,p01,2024-05-02 09:30:00,2,1,1,practice,incomp_left,incomp,>><>>,D,D,412.5,1,correct,green,1000,29,right"
        );
        // Timeout: empty response and rt, outcome code 3.
        assert_eq!(
            lines.next().unwrap(),
            "flanker,p01,2024-05-02 09:30:00,2,1,2,practice,comp_right,comp,>>>>>,J,,,3,too_slow,red,2000,29,right"
        );
    }

    #[test]
    fn json_flattens_properties() {
        let files = payloads(&run_data(OutputFormat::Json)).unwrap();
        assert_eq!(files[0].filename, "flanker_p01.json");
        let rows: serde_json::Value = serde_json::from_str(&files[0].body).unwrap();
        assert_eq!(rows[0]["handedness"], "right");
        assert_eq!(rows[0]["rt"], 412.5);
        assert_eq!(rows[1]["rt"], serde_json::Value::Null);
        assert_eq!(rows[1]["outcome"], 3);
    }

    #[test]
    fn reading_rows_get_their_own_file() {
        let mut data = run_data(OutputFormat::Csv);
        data.results.clear();
        data.reading = vec![ReadingResult {
            block: 1,
            trial: 1,
            sentence: "The cat, sat".into(),
            word_number: 2,
            word: "cat,".into(),
            rt_ms: 310.0,
        }];
        let files = payloads(&data).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "flanker_p01_reading.csv");
        assert!(files[0].body.contains("\"The cat, sat\",2,\"cat,\",310,29,right"));
    }

    #[test]
    fn property_named_like_a_column_is_dropped() {
        let mut data = run_data(OutputFormat::Csv);
        data.participant.properties.insert("block".into(), "x".into());
        let body = &payloads(&data).unwrap()[0].body;
        assert!(body.lines().next().unwrap().ends_with("timestamp_ns,age,handedness"));
    }

    #[test]
    fn property_named_like_a_reading_column_is_dropped() {
        let mut data = run_data(OutputFormat::Csv);
        data.results.clear();
        data.participant.properties.insert("word".into(), "x".into());
        data.participant.properties.insert("sentence".into(), "y".into());
        data.reading = vec![ReadingResult {
            block: 1,
            trial: 1,
            sentence: "Go home".into(),
            word_number: 1,
            word: "Go".into(),
            rt_ms: 250.0,
        }];

        let csv = payloads(&data).unwrap();
        let mut lines = csv[0].body.lines();
        assert_eq!(
            lines.next().unwrap(),
            "experiment,participant,date,block,trial,sentence,word_number,word,rt,age,handedness"
        );
        assert!(lines.next().unwrap().ends_with("Go home,1,Go,250,29,right"));

        data.format = OutputFormat::Json;
        let json = payloads(&data).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&json[0].body).unwrap();
        assert_eq!(rows[0]["word"], "Go");
        assert_eq!(rows[0]["sentence"], "Go home");
        assert_eq!(rows[0].as_object().unwrap().len(), READING_COLUMNS.len() + 2);
    }
}
