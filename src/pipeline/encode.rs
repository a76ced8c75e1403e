//! Payload encoding: diagram source → URL path segment.
//!
//! mermaid.ink-style services take the diagram as a single path segment:
//! the UTF-8 bytes base64-encoded with the URL-safe alphabet and no `=`
//! padding, so the segment never needs percent-escaping.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use tracing::debug;

/// Encode diagram source as URL-safe, unpadded base64.
pub fn encode_source(source: &str) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(source.as_bytes());
    debug!(
        "Encoded {} bytes of diagram source → {} chars",
        source.len(),
        encoded.len()
    );
    encoded
}

/// Inverse of [`encode_source`]. Returns `None` for malformed input.
pub fn decode_source(payload: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    String::from_utf8(bytes).ok()
}
