//! Identity claims decoded from a bearer credential.
//!
//! The credential is a three-segment token whose middle segment is base64url
//! JSON. Signatures are not checked here; the backend stays the authority on
//! validity and answers 401 when it disagrees.

#[cfg(test)]
#[path = "claims_test.rs"]
mod claims_test;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde_json::{Map, Value};

use crate::net::types::UserId;

/// Subject field names, highest priority first.
const SUBJECT_FIELDS: [&str; 3] = ["sub", "user_id", "id"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("credential has {0} segments, expected 3")]
    Malformed(usize),
    #[error("credential payload is not valid base64")]
    PayloadEncoding,
    #[error("credential payload is not a JSON object")]
    PayloadJson,
    #[error("credential carries no usable subject id")]
    MissingSubject,
}

/// Read-only projection of a credential's payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityClaims {
    pub user_id: UserId,
    pub email: Option<String>,
    /// `exp` claim in seconds since the Unix epoch, if present.
    pub expires_at: Option<i64>,
}

impl IdentityClaims {
    #[must_use]
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        self.expires_at.is_some_and(|exp| now_secs >= exp)
    }
}

/// Decode identity claims from a raw credential.
///
/// # Errors
///
/// Returns a [`ClaimsError`] describing why the credential yields no claims.
pub fn decode_claims(raw: &str) -> Result<IdentityClaims, ClaimsError> {
    let segments: Vec<&str> = raw.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(ClaimsError::Malformed(segments.len()));
    }

    let payload = decode_segment(segments[1])?;
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(&payload) else {
        return Err(ClaimsError::PayloadJson);
    };

    let user_id = subject_id(&fields).ok_or(ClaimsError::MissingSubject)?;
    let email = fields
        .get("email")
        .and_then(Value::as_str)
        .filter(|email| !email.is_empty())
        .map(str::to_owned);
    let expires_at = fields.get("exp").and_then(Value::as_i64);

    Ok(IdentityClaims { user_id, email, expires_at })
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, ClaimsError> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|_| ClaimsError::PayloadEncoding)
}

fn subject_id(fields: &Map<String, Value>) -> Option<UserId> {
    SUBJECT_FIELDS.iter().find_map(|name| fields.get(*name).and_then(usable_id))
}

fn usable_id(value: &Value) -> Option<UserId> {
    let id = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (id > 0).then_some(id)
}
