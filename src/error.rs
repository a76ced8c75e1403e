//! Error types for the mmd2svg library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Mmd2SvgError`] — **Fatal**: the batch cannot proceed at all
//!   (document missing or not UTF-8, output directory not writable). Returned
//!   as `Err(Mmd2SvgError)` from the top-level `convert*` functions.
//!
//! * [`DiagramError`] — **Non-fatal**: a single diagram could not be rendered
//!   after all attempts, but the rest of the batch carries on. Stored inside
//!   [`crate::output::DiagramResult`] so callers can inspect partial success.
//!
//! A connectivity failure is the one per-diagram error that also ends the
//! batch; it is recorded as [`DiagramError::ServiceUnreachable`] and the
//! report is marked aborted.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the mmd2svg library.
#[derive(Debug, Error)]
pub enum Mmd2SvgError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input document was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the document.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure while reading the document.
    #[error("Failed to read document '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document bytes are not valid UTF-8 text.
    #[error("Document '{path}' is not valid UTF-8 (invalid byte at offset {offset})")]
    InvalidEncoding { path: PathBuf, offset: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create the output directory or write a rendered diagram.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Batch outcomes (see `BatchReport::into_result`) ───────────────────
    /// The document contains no non-empty diagram blocks.
    #[error("No diagrams found in '{path}'")]
    NoDiagramsFound { path: PathBuf },

    /// Every diagram failed after all attempts.
    #[error("All {total} diagrams failed to render.\nFirst error: {first_error}")]
    AllDiagramsFailed { total: usize, first_error: String },

    /// The rendering service could not be reached; the batch was aborted.
    #[error(
        "Rendering service unreachable after {attempts} attempts on diagram {ordinal}: {detail}\n\
Check your internet connection or --base-url."
    )]
    ServiceUnreachable {
        ordinal: usize,
        attempts: u32,
        detail: String,
    },

    /// The batch was stopped by the user.
    #[error("Interrupted after {succeeded}/{total} diagrams")]
    Interrupted { succeeded: usize, total: usize },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single diagram.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum DiagramError {
    /// All attempts failed with retryable errors.
    #[error("Diagram {ordinal}: render failed after {attempts} attempts: {detail}")]
    RenderFailed {
        ordinal: usize,
        attempts: u32,
        detail: String,
    },

    /// The last attempt could not connect to the service at all.
    #[error("Diagram {ordinal}: service unreachable after {attempts} attempts: {detail}")]
    ServiceUnreachable {
        ordinal: usize,
        attempts: u32,
        detail: String,
    },

    /// The failure classifier marked an attempt as not worth retrying.
    #[error("Diagram {ordinal}: rejected on attempt {attempts}: {detail}")]
    Rejected {
        ordinal: usize,
        attempts: u32,
        detail: String,
    },
}

impl DiagramError {
    /// Ordinal of the diagram this error belongs to.
    pub fn ordinal(&self) -> usize {
        match self {
            DiagramError::RenderFailed { ordinal, .. }
            | DiagramError::ServiceUnreachable { ordinal, .. }
            | DiagramError::Rejected { ordinal, .. } => *ordinal,
        }
    }
}
