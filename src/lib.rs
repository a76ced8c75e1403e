//! # mmd2svg
//!
//! Render the Mermaid diagrams embedded in a text document to SVG files.
//!
//! Rendering is delegated to a mermaid.ink-compatible HTTP service; this
//! crate finds the diagrams, talks to the service with a bounded retry
//! policy, and writes one numbered file per diagram next to the document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! deck.mmd
//!  │
//!  ├─ 1. Input    read the document as UTF-8
//!  ├─ 2. Extract  ```mermaid fenced blocks, numbered 1..k
//!  ├─ 3. Render   GET {base}/svg/{base64url(source)}, retried up to 5×
//!  ├─ 4. Write    deck/diagram_001.svg, deck/diagram_002.svg, …
//!  └─ 5. Report   BatchReport + exit status
//! ```
//!
//! Diagrams are rendered one at a time. A diagram that still fails after
//! its last attempt is recorded and the batch moves on; if the service
//! cannot be reached at all the batch stops early.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mmd2svg::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let report = convert("deck.mmd", &config).await?;
//!     eprintln!("{}: {}/{} diagrams in {}",
//!         report.status(),
//!         report.succeeded,
//!         report.total_diagrams,
//!         report.output_dir.display());
//!     std::process::exit(report.exit_code());
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mmd2svg` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod interrupt;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, OutputFormat};
pub use convert::{
    convert, convert_document, convert_sync, convert_with_interrupt, inspect, Inspection,
};
pub use error::{DiagramError, Mmd2SvgError};
pub use interrupt::Interrupt;
pub use output::{BatchReport, BatchStatus, DiagramResult, EXIT_INTERRUPTED};
pub use pipeline::extract::{extract_diagrams, DiagramBlock};
pub use pipeline::input::SourceDocument;
pub use pipeline::render::{
    HttpTransport, RenderClient, RenderOutcome, RenderTransport, TransportResponse,
};
pub use pipeline::retry::{
    AttemptFailure, DefaultClassifier, FailureClass, FailureClassifier, FailureKind, RetryPolicy,
};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
