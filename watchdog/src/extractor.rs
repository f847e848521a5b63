use serde_json::Value;

use crate::error::ExtractionError;
use crate::types::LAST_INDEX_FIELD;

/// Read the `lastIndex` field out of a node's JSON response.
pub fn extract_index(body: &[u8]) -> Result<u64, ExtractionError> {
    let doc: Value = serde_json::from_slice(body)?;

    let value = doc
        .get(LAST_INDEX_FIELD)
        .ok_or(ExtractionError::MissingField(LAST_INDEX_FIELD))?;

    // Capped at i64::MAX so the reference/local difference cannot overflow.
    match value.as_u64() {
        Some(index) if index <= i64::MAX as u64 => Ok(index),
        _ => Err(ExtractionError::NotAnIndex {
            field: LAST_INDEX_FIELD,
            value: value.clone(),
        }),
    }
}
