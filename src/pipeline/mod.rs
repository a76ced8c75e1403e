//! Pipeline stages for diagram conversion.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the network stage can be swapped for a scripted one in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ encode ──▶ render ──▶ output_writer
//! (UTF-8)   (fences)    (base64)   (HTTP+retry) (diagram_NNN.svg)
//! ```
//!
//! 1. [`input`]   — read the document once and decode it as UTF-8
//! 2. [`extract`] — lazily scan for ` ```mermaid ` blocks, numbering the
//!    non-empty ones
//! 3. [`encode`]  — URL-safe, unpadded base64 payload for the request path
//! 4. [`render`]  — the only stage with network I/O; drives [`retry`]
//! 5. [`output_writer`] — ordinal-derived file names, atomic writes

pub mod encode;
pub mod extract;
pub mod input;
pub mod output_writer;
pub mod render;
pub mod retry;
