use crate::error::ExportError;
use crate::row::{Payload, payloads};
use cogtask_experiment::{DataSink, RunData};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Writes run data under a local directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every file this sink has written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn write(&mut self, payload: &Payload) -> Result<PathBuf, ExportError> {
        let path = self.dir.join(&payload.filename);
        let io = |source| ExportError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io)?;
        fs::write(&path, &payload.body).map_err(io)?;
        info!(path = %path.display(), bytes = payload.body.len(), "data file written");
        self.written.push(path.clone());
        Ok(path)
    }

    pub fn write_run(&mut self, data: &RunData) -> Result<Vec<PathBuf>, ExportError> {
        payloads(data)?
            .iter()
            .map(|payload| self.write(payload))
            .collect()
    }
}

impl DataSink for FileSink {
    fn save(&mut self, data: &RunData) {
        if let Err(err) = self.write_run(data) {
            error!(error = %err, "saving run data failed");
        }
    }

    fn submit_code(&mut self, experiment_name: &str, code: &str) {
        let payload = code_payload(experiment_name, code);
        if let Err(err) = self.write(&payload) {
            error!(error = %err, "saving completion code failed");
        }
    }
}

/// Local copy of a completion code submission.
pub(crate) fn code_payload(experiment_name: &str, code: &str) -> Payload {
    Payload {
        filename: format!("{experiment_name}_code.txt"),
        body: code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::tests::run_data;
    use cogtask_experiment::OutputFormat;

    #[test]
    fn writes_named_files_into_a_fresh_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(tmp.path().join("out"));
        sink.save(&run_data(OutputFormat::Csv));

        let path = tmp.path().join("out/flanker_p01.csv");
        assert_eq!(sink.written(), &[path.clone()]);
        let body = fs::read_to_string(path).unwrap();
        assert_eq!(body.lines().count(), 3);
    }

    #[test]
    fn completion_code_lands_next_to_the_data() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(tmp.path());
        sink.submit_code("flanker", "Q7x");
        let body = fs::read_to_string(tmp.path().join("flanker_code.txt")).unwrap();
        assert_eq!(body, "Q7x");
    }

    #[test]
    fn unwritable_directory_reports_the_path() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let mut sink = FileSink::new(&blocker);
        let err = sink.write_run(&run_data(OutputFormat::Json)).unwrap_err();
        assert!(matches!(err, ExportError::Io { ref path, .. } if path.starts_with(&blocker)));
        // The trait method swallows the failure.
        sink.save(&run_data(OutputFormat::Json));
        assert!(sink.written().is_empty());
    }
}
