//! Decoding of fetched payloads into integer sequences.

use crate::Result;
use serde::Deserialize;

/// The record shape every target is expected to serve.
///
/// Extra fields are ignored. The `numbers` field is required; a payload
/// without it is treated as malformed rather than as an empty sequence. The
/// capitalised `Numbers` key that the front end itself emits is accepted too.
#[derive(Debug, Deserialize)]
struct Record {
    #[serde(alias = "Numbers")]
    numbers: Vec<i64>,
}

/// Decodes a `{"numbers": [...]}` payload.
///
/// # Errors
///
/// Returns [`Error::Decode`](crate::Error::Decode) if the payload is not valid
/// JSON, the `numbers` field is missing, or any element is not an integer that
/// fits in an `i64`.
pub fn extract(payload: &[u8]) -> Result<Vec<i64>> {
    let record: Record = serde_json::from_slice(payload)?;
    Ok(record.numbers)
}
