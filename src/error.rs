use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the input that stop a run before any request is sent.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("input file {0:?} does not exist")]
    InputMissing(PathBuf),

    #[error("could not read input file {path:?}: {reason}")]
    InputUnreadable { path: PathBuf, reason: String },

    #[error("APN column '{column}' not found. Available columns: {available:?}")]
    ColumnMissing { column: String, available: Vec<String> },

    #[error("could not build HTTP client: {0}")]
    Client(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    PageLoadFailed,
    TokenMissing,
    RequestFailed,
    NotFound,
    Ambiguous,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchErrorKind::PageLoadFailed => "PageLoadFailed",
            FetchErrorKind::TokenMissing => "TokenMissing",
            FetchErrorKind::RequestFailed => "RequestFailed",
            FetchErrorKind::NotFound => "NotFound",
            FetchErrorKind::Ambiguous => "Ambiguous",
        };
        f.write_str(name)
    }
}

/// A failed lookup of one APN. Never fatal to the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub detail: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, detail: impl Into<String>) -> Self {
        FetchError {
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("NoDataFound: page contains no owner, address or location section")]
    NoDataFound,
}

/// Low-level HTTP failure reported by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("output file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors that are allowed to end a run early.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Output(#[from] OutputError),
}
