use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Retrieval,
    Data,
    Write,
}

#[derive(Debug, Error, Diagnostic)]
pub enum TripError {
    #[error("source list not found at {0}")]
    #[diagnostic(help("create the file with one URL per line or pass --sources"))]
    MissingSourceList(PathBuf),

    #[error("failed to read source list {path}: {message}")]
    SourceListRead { path: PathBuf, message: String },

    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    #[error("path exists but is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to prepare workspace: {0}")]
    Workspace(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("quantile must be within [0, 1], got {0}")]
    InvalidQuantile(f64),

    #[error("request failed for {url}: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}: {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("failed to store download at {path}: {message}")]
    Download { path: PathBuf, message: String },

    #[error("no .{extension} files found in {dir}")]
    #[diagnostic(help("run `long-trips fetch` first or check --data-dir"))]
    EmptyDataset { dir: PathBuf, extension: String },

    #[error("column {column} not found in {partition}")]
    MissingColumn { column: String, partition: PathBuf },

    #[error("column {column} in {partition} is not numeric ({data_type})")]
    NonNumericColumn {
        column: String,
        partition: PathBuf,
        data_type: String,
    },

    #[error("column {0} has no non-null values")]
    NoValues(String),

    #[error("failed to read parquet {path}: {message}")]
    Parquet { path: PathBuf, message: String },

    #[error("arrow compute failed: {0}")]
    Arrow(String),

    #[error("failed to write results to {path}: {message}")]
    Write { path: PathBuf, message: String },
}

impl TripError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TripError::MissingSourceList(_)
            | TripError::SourceListRead { .. }
            | TripError::InvalidLocator(_)
            | TripError::NotADirectory(_)
            | TripError::Workspace(_)
            | TripError::ConfigRead(_)
            | TripError::ConfigParse(_)
            | TripError::InvalidConfig(_)
            | TripError::InvalidQuantile(_) => ErrorKind::Configuration,
            TripError::Http { .. } | TripError::HttpStatus { .. } | TripError::Download { .. } => {
                ErrorKind::Retrieval
            }
            TripError::EmptyDataset { .. }
            | TripError::MissingColumn { .. }
            | TripError::NonNumericColumn { .. }
            | TripError::NoValues(_)
            | TripError::Parquet { .. }
            | TripError::Arrow(_) => ErrorKind::Data,
            TripError::Write { .. } => ErrorKind::Write,
        }
    }
}
