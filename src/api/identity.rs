//! Caller identity taken from the `x-user-id` header.
//!
//! Authentication happens upstream; this service trusts the header and
//! only checks that it carries a well-formed user id.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::domain::UserId;
use crate::error::SwapError;

/// Header carrying the authenticated caller's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor for the calling user.
///
/// Rejects with [`SwapError::Validation`] when the header is missing or
/// not a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = SwapError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers).map(Self)
    }
}

/// Reads the caller id from `headers`.
///
/// # Errors
///
/// Returns [`SwapError::Validation`] if the header is absent or malformed.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<UserId, SwapError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| SwapError::validation(format!("missing {USER_ID_HEADER} header")))?
        .to_str()
        .map_err(|_| SwapError::validation(format!("{USER_ID_HEADER} is not valid text")))?;
    parse_user_id(raw)
}

/// Parses a user id.
///
/// # Errors
///
/// Returns [`SwapError::Validation`] if `raw` is not a UUID.
pub fn parse_user_id(raw: &str) -> Result<UserId, SwapError> {
    raw.trim()
        .parse()
        .map_err(|_| SwapError::validation(format!("malformed user id: {raw}")))
}
