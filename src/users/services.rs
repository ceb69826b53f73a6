use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use crate::{
    auth::{password, reset},
    error::AppError,
    images::services::{remove_avatar, store_avatar, UploadItem},
    mail::EmailMessage,
    state::AppState,
    users::{
        dto::{LoginRequest, ResetPasswordRequest, SignupRequest, UpdatePasswordRequest},
        repo_types::{NewUser, ProfileUpdate, User},
    },
};

const MIN_PASSWORD_LEN: usize = 8;

/// Stamped this far in the past so a token signed right after the change
/// is not treated as stale.
const PASSWORD_CHANGE_SKEW: Duration = Duration::seconds(1);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn checked_email(raw: &str) -> Result<String, AppError> {
    let email = normalize_email(raw);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Please provide a valid email".into()));
    }
    Ok(email)
}

fn checked_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("User must have a name".into()));
    }
    Ok(name.to_string())
}

/// Length and confirmation rules shared by every password write.
pub(crate) fn check_new_password(password: &str, confirm: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if password != confirm {
        return Err(AppError::Validation("Passwords are not match".into()));
    }
    Ok(())
}

async fn hash(plain: &str) -> Result<String, AppError> {
    let plain = plain.to_owned();
    let hashed = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| anyhow::anyhow!("hash task failed: {e}"))??;
    Ok(hashed)
}

async fn verify(plain: &str, hash: &str) -> Result<bool, AppError> {
    let (plain, hash) = (plain.to_owned(), hash.to_owned());
    let ok = tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| anyhow::anyhow!("verify task failed: {e}"))??;
    Ok(ok)
}

/// Re-hashes and stores a new password, then issues a fresh session token.
async fn set_password(state: &AppState, user: &User, plain: &str) -> Result<String, AppError> {
    let password_hash = hash(plain).await?;
    let changed_at = OffsetDateTime::now_utc() - PASSWORD_CHANGE_SKEW;
    state
        .users
        .update_password(user.id, &password_hash, changed_at)
        .await?;
    info!(user_id = %user.id, "password updated");
    Ok(state.tokens.issue(user.id)?)
}

pub async fn signup(state: &AppState, req: SignupRequest) -> Result<(User, String), AppError> {
    let name = checked_name(&req.name)?;
    let email = checked_email(&req.email)?;
    check_new_password(&req.password, &req.confirm_password)?;

    let new = NewUser {
        name,
        email,
        role: req.role.unwrap_or_default(),
        password_hash: hash(&req.password).await?,
    };
    let user = state.users.create(&new).await?;
    let token = state.tokens.issue(user.id)?;
    info!(user_id = %user.id, email = %user.email, role = %user.role, "user signed up");
    Ok((user, token))
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<String, AppError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Email and password are required!".into()));
    }

    let invalid = || AppError::Unauthenticated("Either email or password are wrong!".into());
    let user = match state.users.find_by_email(&email).await? {
        Some(u) => u,
        None => {
            warn!(email = %email, "login unknown email");
            return Err(invalid());
        }
    };
    if !verify(&req.password, &user.password_hash).await? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    info!(user_id = %user.id, "user logged in");
    Ok(state.tokens.issue(user.id)?)
}

/// Issues a reset token and mails the link. The token is revoked if the
/// mail cannot be sent.
pub async fn forgot_password(state: &AppState, email: &str, base_url: &str) -> Result<(), AppError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AppError::Validation("Please provide your email".into()));
    }
    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no user with this email".into()))?;

    let ttl = state.config.reset_ttl_minutes;
    let token = reset::generate(state.users.as_ref(), user.id, ttl).await?;
    let url = format!(
        "{}/users/resetPassword/{}",
        base_url.trim_end_matches('/'),
        token
    );
    let message = EmailMessage {
        to: user.email.clone(),
        subject: format!("Your password reset token (valid for {} min)", ttl),
        text: format!(
            "Forgot your password? Submit a PATCH request with your new password and \
             confirmPassword to: {}\nIf you didn't forget your password, please ignore this email.",
            url
        ),
    };

    if let Err(e) = state.mailer.send(message).await {
        error!(error = %e, user_id = %user.id, "reset mail failed");
        reset::revoke(state.users.as_ref(), user.id).await?;
        return Err(AppError::Upstream(
            "There was an error sending the email. Try again later!".into(),
        ));
    }
    Ok(())
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    req: ResetPasswordRequest,
) -> Result<String, AppError> {
    let user = reset::consume(state.users.as_ref(), token).await?;
    check_new_password(&req.password, &req.confirm_password)?;
    set_password(state, &user, &req.password).await
}

pub async fn update_password(
    state: &AppState,
    user: &User,
    req: UpdatePasswordRequest,
) -> Result<String, AppError> {
    if !verify(&req.old_password, &user.password_hash).await? {
        warn!(user_id = %user.id, "update password with wrong current password");
        return Err(AppError::Unauthenticated("The password is wrong".into()));
    }
    check_new_password(&req.new_password, &req.confirm_new_password)?;
    set_password(state, user, &req.new_password).await
}

pub struct ProfileInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<UploadItem>,
}

pub async fn update_me(state: &AppState, user: &User, input: ProfileInput) -> Result<User, AppError> {
    let name = input.name.as_deref().map(checked_name).transpose()?;
    let email = input.email.as_deref().map(checked_email).transpose()?;
    let photo = match input.photo {
        Some(item) => Some(store_avatar(state.storage.as_ref(), user.id, item).await?),
        None => None,
    };

    let update = ProfileUpdate {
        name,
        email,
        photo: photo.clone(),
    };
    let result = state
        .users
        .update_profile(user.id, &update)
        .await
        .and_then(|u| u.ok_or_else(|| AppError::NotFound("This account no longer exists".into())));
    let updated = match result {
        Ok(u) => u,
        Err(e) => {
            if let Some(key) = &photo {
                remove_avatar(state.storage.as_ref(), key).await;
            }
            return Err(e);
        }
    };

    if photo.is_some() {
        remove_avatar(state.storage.as_ref(), &user.photo).await;
    }
    info!(user_id = %user.id, "profile updated");
    Ok(updated)
}

pub async fn delete_me(state: &AppState, user: &User) -> Result<(), AppError> {
    state.users.deactivate(user.id).await?;
    info!(user_id = %user.id, "account deactivated");
    Ok(())
}
