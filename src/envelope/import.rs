//! Envelope import from canonical JSON (I3: lossless round-trip).
//!
//! `to_json`/`from_json` are inverses: canonical key-sorting only changes
//! byte layout, never the decoded value, so `from_json(to_json(e)) == e`
//! for every envelope `e`.

use super::Envelope;

/// Import an envelope from JSON bytes produced by `export::to_json`.
pub fn from_json(bytes: &[u8]) -> crate::types::Result<Envelope> {
    Ok(serde_json::from_slice(bytes)?)
}
