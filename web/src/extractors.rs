//! Custom Axum extractors.
//!
//! - [`CurrentIdentity`]: resolve the `Authorization: Bearer <token>` header
//!   to an authenticated [`Identity`]
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     State(state): State<AppState>,
//!     CurrentIdentity(identity): CurrentIdentity,
//! ) -> Result<Json<Response>, AppError> {
//!     require_role(&identity, UserRole::Employee)?;
//!     Ok(Json(response))
//! }
//! ```

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use rentwise_core::Identity;
use rentwise_core::error::AuthError;

/// The authenticated caller.
///
/// Rejects with `401` when the header is missing, malformed, unknown or
/// expired.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for CurrentIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AuthError::Unauthenticated("Missing bearer token".to_string()))?;
        let identity = state.tokens.verify(token).await?;
        Ok(Self(identity))
    }
}

/// Extract the token from an `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
