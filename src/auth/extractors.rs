use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use crate::{
    error::AppError,
    state::AppState,
    users::repo_types::{Role, User},
};

/// Resolves the bearer token into the active user it was issued for.
pub struct AuthUser(pub User);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthenticated("You are not logged in".into()))?;

        let claims = state.tokens.verify(token)?;

        // Inactive accounts are filtered by the store, so they land here too.
        let user = state
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("This account no longer exists".into()))?;

        if user.password_changed_after(claims.issued_at()) {
            warn!(user_id = %user.id, "token predates password change");
            return Err(AppError::Unauthenticated(
                "User's password has been changed, please log in again".into(),
            ));
        }

        Ok(AuthUser(user))
    }
}

/// Role policy applied after authentication.
pub fn restrict_to(allowed: &[Role], user: &User) -> Result<(), AppError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        warn!(user_id = %user.id, role = %user.role, "role not permitted");
        Err(AppError::Forbidden)
    }
}
