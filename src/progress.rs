//! Progress-callback trait for per-diagram conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through each diagram. The CLI uses this to
//! drive its progress bar; library users can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use mmd2svg::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_diagram_complete(&self, ordinal: usize, total: usize, bytes: usize) {
//!         self.rendered.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Diagram {}/{} done ({} bytes)", ordinal, total, bytes);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { rendered: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

/// Called by the conversion pipeline as it processes each diagram.
///
/// Diagrams are processed sequentially, so events for one diagram never
/// interleave with another's. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after extraction, before any request is sent.
    fn on_conversion_start(&self, total_diagrams: usize) {
        let _ = total_diagrams;
    }

    /// Called before the first attempt for a diagram.
    fn on_diagram_start(&self, ordinal: usize, total: usize) {
        let _ = (ordinal, total);
    }

    /// Called after every failed attempt.
    ///
    /// `retry_in` is `Some(delay)` when another attempt follows and `None`
    /// when this was the last one.
    fn on_attempt_failed(
        &self,
        ordinal: usize,
        attempt: u32,
        max_attempts: u32,
        reason: &str,
        retry_in: Option<Duration>,
    ) {
        let _ = (ordinal, attempt, max_attempts, reason, retry_in);
    }

    /// Called when a diagram is rendered and written.
    fn on_diagram_complete(&self, ordinal: usize, total: usize, artifact_len: usize) {
        let _ = (ordinal, total, artifact_len);
    }

    /// Called when a diagram fails after all attempts.
    fn on_diagram_error(&self, ordinal: usize, total: usize, error: &str) {
        let _ = (ordinal, total, error);
    }

    /// Called once when the batch finishes, is aborted, or is interrupted.
    fn on_conversion_complete(&self, total_diagrams: usize, success_count: usize) {
        let _ = (total_diagrams, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
