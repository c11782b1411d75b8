//! JSON codec for documents stored under the config key.

use thiserror::Error;

use crate::document::ConfigurationDocument;

/// Errors decoding or encoding a stored document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Payload is not a well-formed document.
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode a stored payload.
///
/// Returns `Ok(None)` when the payload carries no document at all: empty,
/// whitespace only, or a JSON `null`. Callers decide what "no document" means.
pub fn decode_document(payload: &[u8]) -> Result<Option<ConfigurationDocument>, DocumentError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let doc: Option<ConfigurationDocument> = serde_json::from_slice(payload)?;
    Ok(doc)
}

/// Encode a document as indented JSON, omitting empty optional fields.
pub fn encode_document(doc: &ConfigurationDocument) -> Result<Vec<u8>, DocumentError> {
    Ok(serde_json::to_vec_pretty(doc)?)
}
