use crate::error::ExportError;
use crate::file::{FileSink, code_payload};
use crate::row::{Payload, payloads};
use cogtask_experiment::{DataSink, OutputConfig, RunData};
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub data_endpoint: Option<String>,
    pub code_endpoint: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl UploadOptions {
    pub fn from_output(output: &OutputConfig) -> Self {
        Self {
            data_endpoint: output.data_endpoint.clone(),
            code_endpoint: output.code_endpoint.clone(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(4),
        }
    }
}

fn make_client(options: &UploadOptions) -> Result<Client, ExportError> {
    Ok(Client::builder()
        .timeout(options.timeout)
        .connect_timeout(options.connect_timeout)
        .build()?)
}

/// Posts each file as a `filename`/`filedata` form to the configured
/// endpoint. A failed post is not retried: the payload goes to the local
/// fallback directory instead.
#[derive(Debug)]
pub struct Uploader {
    client: Client,
    options: UploadOptions,
    fallback: FileSink,
}

impl Uploader {
    pub fn new(options: UploadOptions, fallback: FileSink) -> Result<Self, ExportError> {
        Ok(Self {
            client: make_client(&options)?,
            options,
            fallback,
        })
    }

    pub fn from_output(output: &OutputConfig) -> Result<Self, ExportError> {
        Self::new(
            UploadOptions::from_output(output),
            FileSink::new(&output.dir),
        )
    }

    pub fn fallback(&self) -> &FileSink {
        &self.fallback
    }

    pub fn post(&self, url: &str, payload: &Payload) -> Result<(), ExportError> {
        let resp = self
            .client
            .post(url)
            .form(&[
                ("filename", payload.filename.as_str()),
                ("filedata", payload.body.as_str()),
            ])
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ExportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        info!(url, filename = %payload.filename, "uploaded");
        Ok(())
    }

    /// Posts to `endpoint` if there is one; writes locally otherwise or on
    /// failure.
    fn deliver(&mut self, endpoint: Option<&str>, payload: &Payload) {
        if let Some(url) = endpoint {
            match self.post(url, payload) {
                Ok(()) => return,
                Err(err) => warn!(
                    url,
                    filename = %payload.filename,
                    error = %err,
                    "upload failed, keeping a local copy"
                ),
            }
        }
        if let Err(err) = self.fallback.write(payload) {
            warn!(filename = %payload.filename, error = %err, "local fallback failed");
        }
    }
}

impl DataSink for Uploader {
    fn save(&mut self, data: &RunData) {
        let files = match payloads(data) {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %err, "could not encode run data");
                return;
            }
        };
        let endpoint = self.options.data_endpoint.clone();
        for payload in &files {
            self.deliver(endpoint.as_deref(), payload);
        }
    }

    fn submit_code(&mut self, experiment_name: &str, code: &str) {
        let payload = Payload {
            filename: experiment_name.to_string(),
            body: code.to_string(),
        };
        match self.options.code_endpoint.clone() {
            Some(url) => {
                if let Err(err) = self.post(&url, &payload) {
                    warn!(url, error = %err, "code upload failed, keeping a local copy");
                    if let Err(err) = self.fallback.write(&code_payload(experiment_name, code)) {
                        warn!(error = %err, "local fallback failed");
                    }
                }
            }
            None => self.fallback.submit_code(experiment_name, code),
        }
    }
}
