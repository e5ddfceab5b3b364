//! Opaque continue-token codec.
//!
//! A list that gets truncated hands the client a continue token: the
//! base64-encoded, short-keyed JSON serialization of [`ListState`]. The
//! token is opaque to clients and must round-trip unmodified; the framing
//! is stable because changing it would break clients mid-session. Unknown
//! payload fields are ignored for forward compatibility.

use crate::core::error::{BraidError, BraidResult};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Continuation point for a partial list, encoded as the continue token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListState {
    /// Revision of the first successful partition list in the session.
    ///
    /// Pins all subsequent partition lists to the same backend snapshot;
    /// never changes once set within a resumption chain.
    #[serde(rename = "r", default, skip_serializing_if = "String::is_empty")]
    pub revision: String,

    /// Name of the partition in which emission was cut off.
    #[serde(rename = "p", default, skip_serializing_if = "String::is_empty")]
    pub partition_name: String,

    /// Backend-level cursor for resuming inside that partition's own
    /// pagination, if any.
    #[serde(rename = "c", default, skip_serializing_if = "String::is_empty")]
    pub continue_token: String,

    /// Objects already delivered from that partition; the next page must
    /// skip them.
    #[serde(rename = "o", default, skip_serializing_if = "is_zero")]
    pub offset: usize,

    /// Caller-chosen page size, pinned so pagination behaves uniformly
    /// across pages.
    #[serde(rename = "l", default, skip_serializing_if = "is_zero")]
    pub limit: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ListState {
    /// Check whether every field holds its zero value.
    pub fn is_zero(&self) -> bool {
        self == &Self::default()
    }

    /// Encode this state as an opaque token.
    ///
    /// Deterministic for a given state; the zero state encodes to the
    /// empty string, meaning "no more pages".
    pub fn encode(&self) -> String {
        if self.is_zero() {
            return String::new();
        }
        // Serialization of a plain struct cannot fail.
        let payload = serde_json::to_vec(self).unwrap_or_default();
        base64::engine::general_purpose::STANDARD.encode(payload)
    }

    /// Decode an opaque token.
    ///
    /// The empty string decodes to the zero state. Any framing or payload
    /// error surfaces as [`BraidError::MalformedToken`].
    pub fn decode(token: &str) -> BraidResult<Self> {
        if token.is_empty() {
            return Ok(Self::default());
        }
        let payload = base64::engine::general_purpose::STANDARD
            .decode(token)
            .map_err(|e| BraidError::malformed_token(e.to_string()))?;
        serde_json::from_slice(&payload).map_err(|e| BraidError::malformed_token(e.to_string()))
    }
}
