//! Password login.

use crate::auth::verify_password;
use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State};
use rentwise_core::error::AuthError;
use rentwise_core::store::Filter;
use rentwise_core::RentalError;
use serde::{Deserialize, Serialize};

/// Login credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// Account email, matched case-insensitively.
    pub email: String,
    /// Plain-text password.
    pub password: String,
}

/// Issued bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The token to send as `Authorization: Bearer <token>`.
    pub access_token: String,
    /// Always `"bearer"`.
    pub token_type: String,
}

/// Exchange email and password for a bearer token.
///
/// Unknown emails and wrong passwords are indistinguishable to the caller.
///
/// # Endpoint
///
/// ```text
/// POST /auth/token
/// ```
///
/// # Errors
///
/// `401 UNAUTHENTICATED` on bad credentials.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let email = request.email.trim().to_lowercase();
    let users = state
        .users
        .find(&Filter::new().where_eq("email", email.as_str()))
        .await
        .map_err(RentalError::from)?;

    let password = request.password;
    let user = tokio::task::spawn_blocking(move || {
        users
            .into_iter()
            .find(|user| verify_password(&password, &user.password_hash))
    })
    .await
    .map_err(|e| AppError::internal(format!("Password check failed: {e}")))?;
    let Some(user) = user else {
        tracing::warn!(email = %email, "Login rejected");
        return Err(AuthError::Unauthenticated("Incorrect email or password".to_string()).into());
    };

    let access_token = state.tokens.issue(user.identity()).await;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
