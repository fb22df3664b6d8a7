use http::header::{HeaderMap, AUTHORIZATION};

use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Missing,
    Invalid,
    Valid,
}

impl AuthOutcome {
    pub fn into_result(self) -> Result<(), ApiError> {
        match self {
            AuthOutcome::Valid => Ok(()),
            AuthOutcome::Missing => Err(ApiError::AuthMissing),
            AuthOutcome::Invalid => Err(ApiError::AuthInvalid),
        }
    }
}

/// Checks the caller's credential against the shared secret.
///
/// `x-api-key` is used when present, otherwise `Authorization` with an optional
/// `Bearer ` prefix. A header that is present but empty is `Invalid`, not `Missing`.
/// Without a configured secret nothing is `Valid`.
pub fn authenticate(headers: &HeaderMap, secret: Option<&str>) -> AuthOutcome {
    let Some(raw) = headers
        .get(API_KEY_HEADER)
        .or_else(|| headers.get(AUTHORIZATION))
    else {
        return AuthOutcome::Missing;
    };
    let Ok(value) = raw.to_str() else {
        return AuthOutcome::Invalid;
    };
    let credential = value.strip_prefix(BEARER_PREFIX).unwrap_or(value);

    match secret {
        Some(secret) if constant_time_eq(credential.as_bytes(), secret.as_bytes()) => {
            AuthOutcome::Valid
        }
        _ => AuthOutcome::Invalid,
    }
}

// Only the length can leak; the byte comparison always walks the full input.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
