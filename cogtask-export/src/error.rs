use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExportError {
    #[error("failed to write `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv encoding failed")]
    Csv(#[from] csv::Error),

    #[error("csv buffer could not be flushed")]
    CsvFlush(#[source] std::io::Error),

    #[error("json encoding failed")]
    Json(#[from] serde_json::Error),

    #[error("upload request failed")]
    Http(#[from] reqwest::Error),

    #[error("upload to {url} rejected with status {status}")]
    Status { url: String, status: u16 },
    #[error("could not start the save worker")]
    Worker(#[source] std::io::Error),
}
