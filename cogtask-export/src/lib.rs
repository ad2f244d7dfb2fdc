//! Output rows, file naming and delivery of a run's data: local files and
//! form uploads with a local fallback.

pub mod background;
pub mod error;
pub mod file;
pub mod row;
pub mod upload;

pub use background::BackgroundSink;
pub use error::ExportError;
pub use file::FileSink;
pub use row::{OutputRow, Payload, READING_COLUMNS, ReadingRow, TRIAL_COLUMNS, payloads};
pub use upload::{UploadOptions, Uploader};
