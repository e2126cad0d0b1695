//! Error types for the esg2sheet library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Esg2SheetError`] — **Fatal**: the document cannot be exported at all
//!   (upload rejected, job never finished, content fetch failed, model
//!   unreachable, output not writable). Returned as `Err(Esg2SheetError)`
//!   from [`crate::run::process_document`] and recorded per document by the
//!   batch driver.
//!
//! * [`SegmentError`] — **Non-fatal**: the model answered for one segment
//!   but the answer did not follow the row grammar. Stored inside
//!   [`crate::model::SegmentOutcome`] so the rest of the document still
//!   reaches the spreadsheet.

use crate::model::PipelineStage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the esg2sheet library.
#[derive(Debug, Error)]
pub enum Esg2SheetError {
    // ── Submission ────────────────────────────────────────────────────────
    /// Input document does not exist.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Upload to the parsing service failed.
    #[error("Failed to submit '{path}' to the parsing service: {reason}")]
    Submission { path: PathBuf, reason: String },

    // ── Polling ───────────────────────────────────────────────────────────
    /// Status queries kept failing past the retry bound.
    #[error("Status polling for job '{job_id}' failed {attempts} times in a row: {last_error}")]
    Polling {
        job_id: String,
        attempts: u32,
        last_error: String,
    },

    /// The job did not reach a terminal state in time.
    #[error("Job '{job_id}' did not finish within {secs}s\nIncrease --timeout.")]
    Timeout { job_id: String, secs: u64 },

    // ── Fetch ─────────────────────────────────────────────────────────────
    /// Parsed content could not be retrieved.
    #[error("Failed to fetch content for job '{job_id}': {reason}")]
    Fetch { job_id: String, reason: String },

    // ── Classification ────────────────────────────────────────────────────
    /// The classification model could not be reached or returned an error.
    #[error("Classification of segment {segment} failed: {reason}")]
    Classification { segment: usize, reason: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Export ────────────────────────────────────────────────────────────
    /// Could not create or write the output spreadsheet.
    #[error("Failed to write spreadsheet '{path}': {reason}")]
    Export { path: PathBuf, reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required credential is absent from the environment.
    #[error("Missing credential: set {var} in the environment or in .env")]
    MissingCredential { var: String },
}

impl Esg2SheetError {
    /// The error kind as named in failure reports.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound { .. } | Self::Submission { .. } => ErrorKind::Submission,
            Self::Polling { .. } => ErrorKind::Polling,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::Classification { .. } | Self::ProviderNotConfigured { .. } => {
                ErrorKind::Classification
            }
            Self::Export { .. } => ErrorKind::Export,
            Self::InvalidConfig(_) | Self::MissingCredential { .. } => ErrorKind::Config,
        }
    }

    /// The pipeline stage that could not be reached because of this error.
    pub fn stage(&self) -> PipelineStage {
        match self.kind() {
            ErrorKind::Config => PipelineStage::Created,
            ErrorKind::Submission => PipelineStage::Submitted,
            ErrorKind::Polling | ErrorKind::Timeout => PipelineStage::Polling,
            ErrorKind::Fetch => PipelineStage::Parsed,
            ErrorKind::Parse | ErrorKind::Classification => PipelineStage::Classifying,
            ErrorKind::Export => PipelineStage::Exported,
        }
    }
}

/// Names of the error taxonomy, used in logs and batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Submission,
    Polling,
    Timeout,
    Fetch,
    Parse,
    Classification,
    Export,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submission => "SubmissionError",
            Self::Polling => "PollingError",
            Self::Timeout => "TimeoutError",
            Self::Fetch => "FetchError",
            Self::Parse => "ParseError",
            Self::Classification => "ClassificationError",
            Self::Export => "ExportError",
            Self::Config => "ConfigError",
        };
        f.write_str(name)
    }
}

/// Transport-level failure talking to an external service.
///
/// Service clients return this; each pipeline stage wraps it into the
/// matching [`Esg2SheetError`] variant.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request never completed (DNS, TLS, connection reset, client timeout).
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Local I/O while preparing the request.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// A non-fatal error for a single segment.
///
/// The segment contributes no rows; the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SegmentError {
    /// The model response did not match the row grammar.
    #[error("Segment {segment}: unparseable model response: {detail}")]
    Parse { segment: usize, detail: String },
}

impl SegmentError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Parse
    }
}
