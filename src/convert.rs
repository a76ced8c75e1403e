//! Conversion entry points: document in, directory of artifacts + report out.
//!
//! The orchestrator reads the document, extracts the diagram blocks, and
//! renders them strictly one at a time in ordinal order. Each diagram ends
//! either rendered (and written) or failed; a failure never stops the batch,
//! with two exceptions:
//!
//! - the rendering service is unreachable ([`RenderOutcome::Aborted`]):
//!   later diagrams cannot succeed either, so the batch stops and the
//!   report is marked aborted;
//! - the [`Interrupt`] fires: the batch stops at the next check and the
//!   partial report is returned.
//!
//! Files already written are kept in both cases. Only fatal I/O problems
//! (unreadable document, unwritable output) surface as `Err`.

use crate::config::ConversionConfig;
use crate::error::{DiagramError, Mmd2SvgError};
use crate::interrupt::Interrupt;
use crate::output::{BatchReport, DiagramResult};
use crate::pipeline::extract::DiagramBlock;
use crate::pipeline::input::{self, SourceDocument};
use crate::pipeline::output_writer::OutputWriter;
use crate::pipeline::render::{RenderClient, RenderOutcome};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Render every diagram in the document at `path`.
///
/// # Returns
/// `Ok(BatchReport)` whenever the batch ran, whatever its status; check
/// [`BatchReport::status`] or call [`BatchReport::into_result`].
///
/// # Errors
/// Returns `Err(Mmd2SvgError)` only for fatal errors:
/// - document not found, unreadable, or not UTF-8
/// - output directory or file not writable
/// - HTTP client could not be built
pub async fn convert(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchReport, Mmd2SvgError> {
    convert_with_interrupt(path, config, &Interrupt::new()).await
}

/// Like [`convert`], stopping early once `interrupt` is triggered.
pub async fn convert_with_interrupt(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
    interrupt: &Interrupt,
) -> Result<BatchReport, Mmd2SvgError> {
    let path = path.as_ref();
    info!("Starting conversion: {}", path.display());

    let document = input::read_document(path).await?;
    convert_document(&document, config, interrupt).await
}

/// Render the diagrams of an already-loaded document.
pub async fn convert_document(
    document: &SourceDocument,
    config: &ConversionConfig,
    interrupt: &Interrupt,
) -> Result<BatchReport, Mmd2SvgError> {
    let total_start = Instant::now();

    // ── Step 1: Extract ──────────────────────────────────────────────────
    let blocks: Vec<DiagramBlock> = document.diagrams(&config.language).collect();
    let total = blocks.len();

    let writer = match config.output_dir {
        Some(ref dir) => OutputWriter::new(dir, config.format),
        None => OutputWriter::for_document(document.path(), config.format),
    };
    let mut report = BatchReport::new(document.path(), writer.dir(), total);

    if total == 0 {
        warn!(
            "No '{}' diagrams found in {}",
            config.language,
            document.path().display()
        );
        report.duration_ms = total_start.elapsed().as_millis() as u64;
        return Ok(report);
    }
    info!("Found {} diagrams", total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total);
    }

    // ── Step 2: Render and write, one diagram at a time ──────────────────
    let client = RenderClient::from_config(config)?;

    for block in &blocks {
        if interrupt.is_triggered() {
            report.interrupted = true;
            break;
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_diagram_start(block.ordinal, total);
        }
        info!("Processing diagram {}/{}", block.ordinal, total);

        let start = Instant::now();
        let outcome = client.render(block, interrupt).await;
        let attempts = outcome.attempts();

        let error = match outcome {
            RenderOutcome::Rendered { artifact, attempts } => {
                let written = writer.write(block.ordinal, &artifact).await?;
                info!("Saved {}", written.display());
                if let Some(ref cb) = config.progress_callback {
                    cb.on_diagram_complete(block.ordinal, total, artifact.len());
                }
                report.record(DiagramResult {
                    ordinal: block.ordinal,
                    attempts,
                    path: Some(written),
                    bytes: artifact.len(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: None,
                });
                continue;
            }
            RenderOutcome::Interrupted { .. } => {
                report.interrupted = true;
                break;
            }
            RenderOutcome::Failed { reason, attempts } => DiagramError::RenderFailed {
                ordinal: block.ordinal,
                attempts,
                detail: reason,
            },
            RenderOutcome::Rejected { reason, attempts } => DiagramError::Rejected {
                ordinal: block.ordinal,
                attempts,
                detail: reason,
            },
            RenderOutcome::Aborted { reason, attempts } => DiagramError::ServiceUnreachable {
                ordinal: block.ordinal,
                attempts,
                detail: reason,
            },
        };

        let message = error.to_string();
        warn!("{}", message);
        if let Some(ref cb) = config.progress_callback {
            cb.on_diagram_error(block.ordinal, total, &message);
        }

        let abort = matches!(error, DiagramError::ServiceUnreachable { .. });
        report.record(DiagramResult {
            ordinal: block.ordinal,
            attempts,
            path: None,
            bytes: 0,
            duration_ms: start.elapsed().as_millis() as u64,
            error: Some(error.clone()),
        });

        if abort {
            warn!(
                "Rendering service unreachable; skipping {} remaining diagrams",
                total - block.ordinal
            );
            report.aborted = Some(error);
            break;
        }
    }

    // ── Step 3: Finalise ─────────────────────────────────────────────────
    report.duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Conversion finished ({}): {}/{} diagrams, {}ms total",
        report.status(),
        report.succeeded,
        total,
        report.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(total, report.succeeded);
    }

    Ok(report)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchReport, Mmd2SvgError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Mmd2SvgError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(path, config))
}

/// Extracted diagrams of a document, without rendering anything.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub diagrams: Vec<DiagramBlock>,
}

/// Read a document and list its diagram blocks. No network access.
pub async fn inspect(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<Inspection, Mmd2SvgError> {
    let document = input::read_document(path).await?;
    let diagrams: Vec<DiagramBlock> = document.diagrams(&config.language).collect();
    debug!(
        "Inspected {}: {} diagrams",
        document.path().display(),
        diagrams.len()
    );

    let output_dir = match config.output_dir {
        Some(ref dir) => dir.clone(),
        None => OutputWriter::for_document(document.path(), config.format)
            .dir()
            .to_path_buf(),
    };

    Ok(Inspection {
        source: document.path().to_path_buf(),
        output_dir,
        diagrams,
    })
}
