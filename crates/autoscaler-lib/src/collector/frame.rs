//! Framing of the container stats feed
//!
//! The feed interleaves control lines (chunk sizes, keep-alives) with data
//! lines of the form `<prefix>:<json payload>`. Only data lines carry a
//! snapshot; everything else is skipped.

use crate::models::StatSnapshot;

/// Shortest line that can plausibly hold a stats payload
pub const MIN_RECORD_LEN: usize = 100;

/// Extract the JSON payload from a raw record line, terminator included.
///
/// Returns `None` for lines that are too short or have no colon separator.
/// Works on raw bytes: control lines need not be valid UTF-8.
pub fn extract_payload<L>(line: &L) -> Option<&[u8]>
where
    L: AsRef<[u8]> + ?Sized,
{
    let line = line.as_ref();
    if line.len() < MIN_RECORD_LEN {
        return None;
    }

    let colon = line.iter().position(|&b| b == b':')?;
    Some(line[colon + 1..].trim_ascii())
}

/// Decode a record payload into a snapshot
pub fn decode_snapshot(payload: &[u8]) -> Result<StatSnapshot, serde_json::Error> {
    serde_json::from_slice(payload)
}
