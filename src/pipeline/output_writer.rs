//! Output writer: ordinal → file name, artifact → disk.
//!
//! Files land in a directory named after the document stem, next to the
//! document (`slides/deck.mmd` → `slides/deck/diagram_001.svg`). The name
//! depends only on the ordinal, so re-running a document overwrites the
//! same files instead of accumulating new ones.
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so a
//! crash never leaves a half-written artifact under the final name.

use crate::config::OutputFormat;
use crate::error::Mmd2SvgError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persists rendered artifacts for one document.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
    format: OutputFormat,
}

/// Sibling directory named after the document stem.
pub fn output_dir_for(document: &Path) -> PathBuf {
    let stem = document
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "diagrams".into());
    match document.parent() {
        Some(parent) => parent.join(stem),
        None => PathBuf::from(stem),
    }
}

impl OutputWriter {
    /// Writer for the directory derived from `document`.
    pub fn for_document(document: &Path, format: OutputFormat) -> Self {
        Self::new(output_dir_for(document), format)
    }

    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `diagram_001.svg`, `diagram_042.png`, …
    pub fn file_name(&self, ordinal: usize) -> String {
        format!("diagram_{:03}.{}", ordinal, self.format.extension())
    }

    pub fn path_for(&self, ordinal: usize) -> PathBuf {
        self.dir.join(self.file_name(ordinal))
    }

    /// Write `artifact` for `ordinal`, creating the directory if needed and
    /// replacing any existing file.
    pub async fn write(&self, ordinal: usize, artifact: &[u8]) -> Result<PathBuf, Mmd2SvgError> {
        let path = self.path_for(ordinal);
        let write_err = |source| Mmd2SvgError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| Mmd2SvgError::OutputWriteFailed {
                path: self.dir.clone(),
                source,
            })?;

        let tmp_ext = format!("{}.tmp", self.format.extension());
        let tmp_path = path.with_extension(tmp_ext);
        tokio::fs::write(&tmp_path, artifact)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(write_err)?;

        debug!("Wrote {} bytes to {}", artifact.len(), path.display());
        Ok(path)
    }
}
