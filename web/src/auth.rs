//! Bearer token issuer and verifier.
//!
//! Tokens are opaque 256-bit random values, base64url encoded (43
//! characters). Only the SHA-256 digest of a token is kept, so a dump of the
//! table cannot be replayed.
//!
//! # Example
//!
//! ```ignore
//! let tokens = TokenService::new(chrono::Duration::minutes(30), Arc::new(SystemClock));
//! let token = tokens.issue(user.identity()).await;
//! let identity = tokens.verify(&token).await?;
//! require_role(&identity, UserRole::Employee)?;
//! ```

use chrono::{DateTime, Duration, Utc};
use rentwise_core::environment::Clock;
use rentwise_core::error::AuthError;
use rentwise_core::{Identity, UserRole};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type TokenDigest = [u8; 32];

#[derive(Debug, Clone)]
struct IssuedToken {
    identity: Identity,
    expires_at: DateTime<Utc>,
}

/// In-process token table with a fixed time-to-live.
pub struct TokenService {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    tokens: RwLock<HashMap<TokenDigest, IssuedToken>>,
}

impl TokenService {
    /// Create an empty table whose tokens live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token bound to `identity`.
    ///
    /// Expired entries are purged on the way.
    pub async fn issue(&self, identity: Identity) -> String {
        let token = generate_token();
        let now = self.clock.now();
        let expires_at = now + self.ttl;

        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, issued| issued.expires_at > now);
        tracing::info!(identity = %identity.id, role = %identity.role, %expires_at, "Token issued");
        tokens.insert(digest(&token), IssuedToken { identity, expires_at });
        token
    }

    /// Resolve `token` to the identity it was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] if the token is unknown or
    /// expired. Expired tokens are removed.
    pub async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let key = digest(token);
        let issued = self.tokens.read().await.get(&key).cloned();
        let Some(issued) = issued else {
            return Err(AuthError::Unauthenticated("Unknown token".to_string()));
        };

        if issued.expires_at <= self.clock.now() {
            self.tokens.write().await.remove(&key);
            tracing::debug!(identity = %issued.identity.id, "Expired token rejected");
            return Err(AuthError::Unauthenticated("Token expired".to_string()));
        }
        Ok(issued.identity)
    }

    /// Number of tokens held, expired or not.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Whether no tokens are held.
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

/// Require `identity` to hold `role`.
///
/// # Errors
///
/// Returns [`AuthError::Forbidden`] otherwise.
pub fn require_role(identity: &Identity, role: UserRole) -> Result<(), AuthError> {
    if identity.has_role(role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden { required: role })
    }
}

/// Work factor for newly hashed passwords.
pub const PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;

/// Salted bcrypt hash of a password, as stored on user records.
///
/// Pass [`PASSWORD_COST`] unless a lower cost is wanted, e.g. for fixtures.
///
/// # Errors
///
/// Returns the bcrypt error if `cost` is outside 4..=31.
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Check `password` against a stored bcrypt hash.
///
/// A malformed stored hash never matches. This is CPU-bound; call it off the
/// async workers.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match bcrypt::verify(password, stored_hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is not valid bcrypt");
            false
        },
    }
}

fn generate_token() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

fn digest(token: &str) -> TokenDigest {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(token.as_bytes()));
    out
}
