//! Opaque revision tokens
//!
//! Clients hold revisions as opaque strings: a versioned JSON envelope
//! around the revision's text form, URL-safe base64 without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::errors::{RevisionError, RevisionResult};
use super::Revision;

/// Current token envelope version.
pub const TOKEN_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
    v: u8,
    rev: Revision,
}

/// Encodes a revision as an opaque token.
pub fn encode(revision: &Revision) -> String {
    let envelope = Envelope {
        v: TOKEN_VERSION,
        rev: revision.clone(),
    };
    // An envelope of a u8 and a string always serializes.
    let json = serde_json::to_vec(&envelope).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decodes a token produced by [`encode`].
pub fn decode(token: &str) -> RevisionResult<Revision> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|e| RevisionError::InvalidToken(e.to_string()))?;

    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| RevisionError::InvalidToken(e.to_string()))?;
    let version = value
        .get("v")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RevisionError::InvalidToken("missing version".to_string()))?;
    if version != u64::from(TOKEN_VERSION) {
        return Err(RevisionError::UnsupportedTokenVersion(
            u8::try_from(version).unwrap_or(u8::MAX),
        ));
    }

    let envelope: Envelope =
        serde_json::from_value(value).map_err(|e| RevisionError::InvalidToken(e.to_string()))?;
    Ok(envelope.rev)
}
