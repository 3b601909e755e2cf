//! Extract the acting user from the `X-User-ID` header.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const USER_ID_HEADER: &str = "X-User-ID";

/// Optional acting user id. Absent or blank headers give `None`; anything else must be an integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActingUser(pub Option<i64>);

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(ActingUser(None));
        };
        let s = raw
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("{} must be ASCII", USER_ID_HEADER)))?
            .trim();
        if s.is_empty() {
            return Ok(ActingUser(None));
        }
        s.parse::<i64>()
            .map(|id| ActingUser(Some(id)))
            .map_err(|_| AppError::BadRequest(format!("{} must be an integer user id", USER_ID_HEADER)))
    }
}
