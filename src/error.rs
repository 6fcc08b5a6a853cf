use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("invalid destination url: {0}")]
    InvalidDestination(String),

    #[error("destination scheme `{found}` does not match storage backend `{expected}`")]
    #[diagnostic(help("use a destination of the form {expected}://bucket/prefix"))]
    SchemeMismatch { expected: String, found: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("download request failed: {0}")]
    Http(String),

    #[error("download returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("no extraction format registered for {0}")]
    UnsupportedArchive(String),

    #[error("failed to extract {archive}: {message}")]
    Extraction { archive: String, message: String },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("failed to write partitions for {source_file}: {message}")]
    Conversion {
        source_file: String,
        message: String,
    },

    #[error("object storage error: {0}")]
    Storage(String),

    #[error("token statistics failed: {0}")]
    Tokens(String),
}
