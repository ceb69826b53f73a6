//! One-time password reset tokens. Only the SHA-256 of a token is stored.
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    users::{repo::UserStore, repo_types::User},
};

const TOKEN_BYTES: usize = 32;

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Deterministic one-way digest used for storage and lookup.
pub fn hash_reset_token(plain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plain.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn random_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    to_hex(&buf)
}

/// Issues a token for `user_id`, replacing any pending one. Returns the plaintext.
pub async fn generate(
    store: &dyn UserStore,
    user_id: Uuid,
    ttl_minutes: i64,
) -> Result<String, AppError> {
    let plain = random_token();
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(ttl_minutes);
    store
        .set_reset_token(user_id, Some((hash_reset_token(&plain), expires_at)))
        .await?;
    info!(user_id = %user_id, %expires_at, "password reset token issued");
    Ok(plain)
}

/// Clears a pending token. Used when the token could not be delivered.
pub async fn revoke(store: &dyn UserStore, user_id: Uuid) -> Result<(), AppError> {
    store.set_reset_token(user_id, None).await?;
    warn!(user_id = %user_id, "password reset token revoked");
    Ok(())
}

/// Resolves a plaintext token to its active, unexpired owner.
///
/// Does not clear the token; the caller does that together with the
/// password write.
pub async fn consume(store: &dyn UserStore, plain: &str) -> Result<User, AppError> {
    let hash = hash_reset_token(plain);
    store
        .find_by_reset_token(&hash, OffsetDateTime::now_utc())
        .await?
        .ok_or(AppError::TokenInvalidOrExpired)
}
