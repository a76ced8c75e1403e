//! Diagram extraction: find fenced diagram blocks in document text.
//!
//! A block opens on a line whose trimmed form starts with ` ``` ` immediately
//! followed by the language tag (` ```mermaid `), and closes on the next line
//! whose trimmed form starts with a bare ` ``` `. The closing fence is
//! consumed but not kept. A block still open at end of input is closed
//! implicitly; parsing never fails.
//!
//! Blocks with no content lines are dropped before an ordinal is assigned,
//! so ordinals are always `1..=k` over the blocks actually emitted.
//!
//! Lines are split on `\n` only and kept verbatim, apart from the `\r` of a
//! CRLF ending. A trailing newline inside an unterminated block is therefore
//! part of its source.

use serde::{Deserialize, Serialize};
use std::str::Split;

/// The fence marker shared by opening and closing lines.
pub const FENCE: &str = "```";

/// Default diagram-language tag.
pub const DEFAULT_LANGUAGE: &str = "mermaid";

/// One fenced region of diagram source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramBlock {
    /// 1-based position among the non-empty blocks of the document.
    pub ordinal: usize,
    /// Verbatim inner lines joined with `\n`.
    pub source: String,
}

/// Lazy iterator over the diagram blocks of a text.
///
/// Cloning the iterator (or calling [`extract_diagrams`] again) restarts the
/// scan from wherever the clone was taken.
#[derive(Debug, Clone)]
pub struct DiagramBlocks<'a> {
    lines: Split<'a, char>,
    opener: String,
    next_ordinal: usize,
}

impl<'a> DiagramBlocks<'a> {
    fn new(text: &'a str, language: &str) -> Self {
        Self {
            lines: text.split('\n'),
            opener: format!("{FENCE}{language}"),
            next_ordinal: 1,
        }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        let line = self.lines.next()?;
        Some(line.strip_suffix('\r').unwrap_or(line))
    }

    /// Collect the body of a block whose opening fence was just consumed.
    fn read_body(&mut self) -> Vec<&'a str> {
        let mut body = Vec::new();
        while let Some(line) = self.next_line() {
            if line.trim().starts_with(FENCE) {
                break;
            }
            body.push(line);
        }
        body
    }
}

impl Iterator for DiagramBlocks<'_> {
    type Item = DiagramBlock;

    fn next(&mut self) -> Option<DiagramBlock> {
        while let Some(line) = self.next_line() {
            if !line.trim().starts_with(&self.opener) {
                continue;
            }
            let body = self.read_body();
            if body.is_empty() {
                continue;
            }
            let ordinal = self.next_ordinal;
            self.next_ordinal += 1;
            return Some(DiagramBlock {
                ordinal,
                source: body.join("\n"),
            });
        }
        None
    }
}

/// Extract the ` ```mermaid ` blocks of `text`.
pub fn extract_diagrams(text: &str) -> DiagramBlocks<'_> {
    extract_diagrams_tagged(text, DEFAULT_LANGUAGE)
}

/// Extract blocks fenced with an arbitrary language tag.
pub fn extract_diagrams_tagged<'a>(text: &'a str, language: &str) -> DiagramBlocks<'a> {
    DiagramBlocks::new(text, language)
}

/// Number of non-empty blocks tagged `language` in `text`.
pub fn count_diagrams(text: &str, language: &str) -> usize {
    extract_diagrams_tagged(text, language).count()
}
