use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header::HOST, HeaderMap, StatusCode},
    routing::{delete, get, patch, post},
    Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::{restrict_to, AuthUser},
    error::AppError,
    images::services::UploadItem,
    response::{AppJson, AppPath, Envelope},
    state::AppState,
    users::{
        dto::{
            ForgotPasswordRequest, LoginRequest, ProfileResponse, ResetPasswordRequest,
            SignupRequest, UpdatePasswordRequest,
        },
        repo_types::{Role, User},
        services::{self, ProfileInput},
    },
};

const AVATAR_BODY_LIMIT: usize = 10 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/forgotPassword", post(forgot_password))
        .route("/resetPassword/:token", patch(reset_password))
        .route("/updatePassword", patch(update_password))
        .route(
            "/updateMe",
            patch(update_me).layer(DefaultBodyLimit::max(AVATAR_BODY_LIMIT)),
        )
        .route("/deleteMe", delete(delete_me))
        .route("/getUsers", get(get_users))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<(StatusCode, Envelope<User>), AppError> {
    let (user, token) = services::signup(&state, payload).await?;
    Ok((StatusCode::CREATED, Envelope::data(user).with_token(token)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Envelope<()>, AppError> {
    let token = services::login(&state, payload).await?;
    Ok(Envelope::token(token))
}

/// Base for links in outgoing mail: `PUBLIC_URL`, else the request's host.
/// The fallback only applies to the log-only mailer; config rejects a relay
/// without `PUBLIC_URL`.
fn public_base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.config.public_url {
        return url.clone();
    }
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}", scheme, host)
}

#[instrument(skip(state, headers, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> Result<Envelope<()>, AppError> {
    let base_url = public_base_url(&state, &headers);
    services::forgot_password(&state, &payload.email, &base_url).await?;
    Ok(Envelope::message("Token sent to email!"))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppPath(token): AppPath<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Envelope<()>, AppError> {
    let token = services::reset_password(&state, &token, payload).await?;
    Ok(Envelope::token(token))
}

#[instrument(skip(state, user, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(payload): AppJson<UpdatePasswordRequest>,
) -> Result<Envelope<()>, AppError> {
    let token = services::update_password(&state, &user, payload).await?;
    Ok(Envelope::token(token))
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

/// Multipart form: optional `name`, `email` and `photo` (image file).
#[instrument(skip(state, user, multipart))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Envelope<ProfileResponse>, AppError> {
    let mut mp = multipart?;
    let mut input = ProfileInput {
        name: None,
        email: None,
        photo: None,
    };
    while let Some(field) = mp.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "name" => input.name = non_empty(field.text().await?),
            "email" => input.email = non_empty(field.text().await?),
            "photo" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field.bytes().await?;
                // Browsers send an empty part when no file was picked.
                if !body.is_empty() {
                    input.photo = Some(UploadItem { body, content_type });
                }
            }
            _ => {}
        }
    }

    let updated = services::update_me(&state, &user, input).await?;
    Ok(Envelope::data(ProfileResponse::from(updated)))
}

#[instrument(skip(state, user))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode, AppError> {
    services::delete_me(&state, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user))]
pub async fn get_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Envelope<Vec<User>>, AppError> {
    restrict_to(&[Role::Admin], &user)?;
    let users = state.users.list_active().await?;
    Ok(Envelope::list(users))
}
