//! Input resolution: read the source document as UTF-8 text.
//!
//! The document is read once, in full, and never mutated. The extension is
//! advisory: anything other than `.mmd` earns a warning, not an error.

use crate::error::Mmd2SvgError;
use crate::pipeline::extract::{extract_diagrams_tagged, DiagramBlocks};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension the tool expects its input to carry.
pub const EXPECTED_EXTENSION: &str = "mmd";

/// An immutable, decoded source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    path: PathBuf,
    text: String,
}

impl SourceDocument {
    /// Wrap already-decoded text, e.g. for tests or in-memory callers.
    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// A fresh scan over the diagram blocks tagged `language`.
    pub fn diagrams(&self, language: &str) -> DiagramBlocks<'_> {
        extract_diagrams_tagged(&self.text, language)
    }
}

/// True when `path` carries the expected `.mmd` extension (case-insensitive).
pub fn has_expected_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EXPECTED_EXTENSION))
}

/// Read and decode the document at `path`.
pub async fn read_document(path: impl AsRef<Path>) -> Result<SourceDocument, Mmd2SvgError> {
    let path = path.as_ref().to_path_buf();

    if !has_expected_extension(&path) {
        warn!(
            "File '{}' does not have a .{} extension",
            path.display(),
            EXPECTED_EXTENSION
        );
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| read_error(&path, e))?;
    let text = decode_text(&path, bytes)?;

    debug!("Read {} bytes from {}", text.len(), path.display());
    Ok(SourceDocument { path, text })
}

fn read_error(path: &Path, e: io::Error) -> Mmd2SvgError {
    let path = path.to_path_buf();
    match e.kind() {
        io::ErrorKind::NotFound => Mmd2SvgError::FileNotFound { path },
        io::ErrorKind::PermissionDenied => Mmd2SvgError::PermissionDenied { path },
        _ => Mmd2SvgError::ReadFailed { path, source: e },
    }
}

/// Strict UTF-8 decode; a leading byte-order mark is dropped.
fn decode_text(path: &Path, bytes: Vec<u8>) -> Result<String, Mmd2SvgError> {
    let mut text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let offset = e.utf8_error().valid_up_to();
            let path = path.to_path_buf();
            return Err(Mmd2SvgError::InvalidEncoding { path, offset });
        }
    };

    if text.starts_with('\u{FEFF}') {
        text.replace_range(..'\u{FEFF}'.len_utf8(), "");
    }
    Ok(text)
}
