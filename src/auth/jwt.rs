use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{config::JwtConfig, error::AppError, state::AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub iat: usize,  // issued at (unix seconds)
    pub exp: usize,  // expires at (unix seconds)
    pub iss: String,
    pub aud: String,
}

impl Claims {
    pub fn issued_at(&self) -> i64 {
        self.iat as i64
    }
}

/// Signs and verifies session tokens. Built once from `JwtConfig`.
#[derive(Clone)]
pub struct SessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl FromRef<AppState> for SessionTokens {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl SessionTokens {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_days.max(0) as u64) * 24 * 60 * 60),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(&self, user_id: Uuid, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    /// Expired, malformed, foreign and forged tokens all fail the same way.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "session token rejected");
            AppError::Unauthenticated("Invalid or expired token, please log in again".into())
        })?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}
