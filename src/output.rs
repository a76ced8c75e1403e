//! Result types: per-diagram records and the batch report.
//!
//! [`BatchReport`] is built incrementally by the orchestrator, one
//! [`DiagramResult`] per attempted diagram in ordinal order, and is never
//! touched again once the batch finishes. Its [`BatchStatus`] and process
//! exit code are derived, not stored.

use crate::error::{DiagramError, Mmd2SvgError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Exit code for a run that stopped on user request (128 + SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

/// Outcome of one attempted diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramResult {
    /// 1-based ordinal of the diagram in the document.
    pub ordinal: usize,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Written file, on success.
    pub path: Option<PathBuf>,
    /// Artifact size in bytes (0 on failure).
    pub bytes: usize,
    /// Wall-clock time spent on this diagram, retries included.
    pub duration_ms: u64,
    /// Why the diagram failed, if it did.
    pub error: Option<DiagramError>,
}

impl DiagramResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Overall classification of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every diagram rendered (and there was at least one).
    AllSucceeded,
    /// Some, but not all, diagrams rendered.
    PartialSuccess,
    /// The document has no diagram blocks.
    NoneFound,
    /// Diagrams were found but none rendered.
    AllFailed,
    /// The rendering service was unreachable; the batch stopped early.
    Aborted,
    /// The user stopped the batch.
    Interrupted,
}

impl BatchStatus {
    /// A run is useful when at least one diagram was rendered and the batch
    /// ran to completion.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            BatchStatus::AllSucceeded | BatchStatus::PartialSuccess
        )
    }

    /// Process exit code: 0 useful, 1 failed, 130 interrupted.
    pub fn exit_code(&self) -> i32 {
        match self {
            BatchStatus::AllSucceeded | BatchStatus::PartialSuccess => 0,
            BatchStatus::NoneFound | BatchStatus::AllFailed | BatchStatus::Aborted => 1,
            BatchStatus::Interrupted => EXIT_INTERRUPTED,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::AllSucceeded => "all succeeded",
            BatchStatus::PartialSuccess => "partial success",
            BatchStatus::NoneFound => "no diagrams found",
            BatchStatus::AllFailed => "all failed",
            BatchStatus::Aborted => "aborted",
            BatchStatus::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Aggregate result of one run over one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// The document that was read.
    pub source: PathBuf,
    /// Where artifacts are (or would have been) written.
    pub output_dir: PathBuf,
    /// Non-empty diagram blocks found in the document.
    pub total_diagrams: usize,
    /// Diagrams rendered and written.
    pub succeeded: usize,
    /// One entry per attempted diagram, in ordinal order.
    pub diagrams: Vec<DiagramResult>,
    /// Set when a connectivity failure stopped the batch.
    pub aborted: Option<DiagramError>,
    /// Set when the user stopped the batch.
    pub interrupted: bool,
    /// Wall-clock time for the whole run.
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn new(source: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, total: usize) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            total_diagrams: total,
            succeeded: 0,
            diagrams: Vec::with_capacity(total),
            aborted: None,
            interrupted: false,
            duration_ms: 0,
        }
    }

    /// Append the result of one diagram.
    pub fn record(&mut self, result: DiagramResult) {
        if result.succeeded() {
            self.succeeded += 1;
        }
        self.diagrams.push(result);
    }

    /// Diagrams that did not render, including any never attempted.
    pub fn failed(&self) -> usize {
        self.total_diagrams.saturating_sub(self.succeeded)
    }

    /// Diagrams that were never attempted because the batch stopped early.
    pub fn not_attempted(&self) -> usize {
        self.total_diagrams.saturating_sub(self.diagrams.len())
    }

    pub fn status(&self) -> BatchStatus {
        if self.interrupted {
            BatchStatus::Interrupted
        } else if self.aborted.is_some() {
            BatchStatus::Aborted
        } else if self.total_diagrams == 0 {
            BatchStatus::NoneFound
        } else if self.succeeded == 0 {
            BatchStatus::AllFailed
        } else if self.succeeded < self.total_diagrams {
            BatchStatus::PartialSuccess
        } else {
            BatchStatus::AllSucceeded
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status().exit_code()
    }

    /// Paths of all written files, in ordinal order.
    pub fn written_files(&self) -> Vec<&PathBuf> {
        self.diagrams
            .iter()
            .filter_map(|d| d.path.as_ref())
            .collect()
    }

    /// Treat every non-useful status as an error.
    pub fn into_result(self) -> Result<BatchReport, Mmd2SvgError> {
        match self.status() {
            BatchStatus::AllSucceeded | BatchStatus::PartialSuccess => Ok(self),
            BatchStatus::NoneFound => Err(Mmd2SvgError::NoDiagramsFound { path: self.source }),
            BatchStatus::AllFailed => {
                let first_error = self
                    .diagrams
                    .iter()
                    .find_map(|d| d.error.as_ref())
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string());
                Err(Mmd2SvgError::AllDiagramsFailed {
                    total: self.total_diagrams,
                    first_error,
                })
            }
            BatchStatus::Aborted => match self.aborted {
                Some(DiagramError::ServiceUnreachable {
                    ordinal,
                    attempts,
                    detail,
                }) => Err(Mmd2SvgError::ServiceUnreachable {
                    ordinal,
                    attempts,
                    detail,
                }),
                other => Err(Mmd2SvgError::Internal(format!(
                    "batch aborted without a connectivity error: {other:?}"
                ))),
            },
            BatchStatus::Interrupted => Err(Mmd2SvgError::Interrupted {
                succeeded: self.succeeded,
                total: self.total_diagrams,
            }),
        }
    }
}
