//! Error types for the pagescan library.
//!
//! Three distinct error types reflect three distinct failure scopes:
//!
//! * [`PipelineError`] (**job-level**): the document cannot be processed at
//!   all (input missing, conversion failed, rasterizer produced nothing).
//!   Returned as `Err(PipelineError)` from [`crate::process::process_document`].
//!   One variant, [`PipelineError::MetadataUnavailable`], is recoverable: the
//!   orchestrator logs it and carries on with degraded metadata.
//!
//! * [`EncodeError`] and [`InferenceError`] (**page-level**): a single page
//!   could not be read or answered. These never cross the page task
//!   boundary; they are folded into a [`crate::output::PageOutcome`] with the
//!   matching [`crate::output::PageStatus`] so sibling pages are unaffected.

use std::path::PathBuf;
use thiserror::Error;

/// Job-level errors returned by [`crate::process::process_document`].
///
/// Page-level failures are recorded in [`crate::output::PageOutcome`]
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Validation ───────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the upload was saved before processing started.")]
    InputNotFound { path: PathBuf },

    /// The job working directory could not be created.
    #[error("Failed to prepare working directory '{path}': {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── External tools ───────────────────────────────────────────────────
    /// The document-to-PDF converter did not produce a PDF.
    #[error("Document conversion failed for '{path}': {detail}")]
    ConversionFailed { path: PathBuf, detail: String },

    /// The rasterizer produced zero page images.
    #[error("Rasterisation failed for '{path}': {detail}")]
    RasterisationFailed { path: PathBuf, detail: String },

    /// The metadata tool failed. Recoverable: never returned from
    /// `process_document`, only logged.
    #[error("Metadata extraction failed for '{path}': {detail}")]
    MetadataUnavailable { path: PathBuf, detail: String },

    // ── Aggregation ──────────────────────────────────────────────────────
    /// Pages were scheduled but not a single outcome came back.
    #[error("Aggregation failed: {expected} pages were scheduled but no page outcomes were collected")]
    NoOutcomesCollected { expected: usize },

    // ── Admission ────────────────────────────────────────────────────────
    /// No credential was supplied and the policy requires one.
    #[error("Missing model API credential.\nProvide it with --api-key or LLM_API_KEY.")]
    MissingCredential,

    /// The endpoint rejected the credential during the capability probe.
    #[error("Model credential rejected by '{endpoint}': {detail}")]
    CredentialRejected { endpoint: String, detail: String },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Name of the pipeline stage this error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::InputNotFound { .. } | PipelineError::WorkDir { .. } => "validating",
            PipelineError::ConversionFailed { .. } => "converting",
            PipelineError::RasterisationFailed { .. } => "rasterizing",
            PipelineError::MetadataUnavailable { .. } => "metadata",
            PipelineError::NoOutcomesCollected { .. } => "aggregating",
            PipelineError::MissingCredential | PipelineError::CredentialRejected { .. } => {
                "admission"
            }
            PipelineError::InvalidConfig(_) => "configuration",
            PipelineError::Internal(_) => "internal",
        }
    }
}

/// Failure to turn a raster image into a transport payload.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The image file does not exist.
    #[error("Image file not found for encoding: '{path}'")]
    NotFound { path: PathBuf },

    /// The image file exists but could not be read.
    #[error("I/O error reading image '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Anything else, e.g. the blocking encode task was cancelled.
    #[error("Unexpected error encoding image '{path}': {detail}")]
    Unexpected { path: PathBuf, detail: String },
}

/// Failure of a single inference call.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// The call did not finish within the configured timeout.
    #[error("Model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection-level failure (DNS, TLS, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-2xx status.
    #[error("Model API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The body was not a chat-completion document.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl InferenceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, InferenceError::Timeout { .. })
    }
}
