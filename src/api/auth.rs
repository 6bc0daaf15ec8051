//! Authentication endpoints
//!
//! - `POST /api/auth/register` - create account on the panel, then locally
//! - `POST /api/auth/login` - form-encoded credentials, returns bearer token
//! - `GET /api/auth/me` - caller's own profile
//! - `POST /api/auth/logout` - acknowledgment only (tokens are stateless)

use axum::{
    extract::State,
    routing::{get, post},
    Form, Json, Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::api::MessageResponse;
use crate::auth::{self, AuthError, AuthUser};
use crate::error::ApiError;
use crate::server::AppState;
use crate::store::{NewUser, User};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex")
});

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

/// Create an account. The panel is the source of truth: no local record is
/// written unless the panel confirms creation, and a panel failure fails the
/// whole operation.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<User>, ApiError> {
    if req.username.trim().is_empty() {
        return Err(ApiError::Validation("username must not be empty".into()));
    }
    if !EMAIL_RE.is_match(&req.email) {
        return Err(ApiError::Validation("invalid email address".into()));
    }

    if state
        .store
        .find_user_by_username_or_email(&req.username, &req.email)?
        .is_some()
    {
        return Err(ApiError::Validation(
            "Username or email already registered".into(),
        ));
    }

    let remote = state
        .panel
        .create_user(&req.username, &req.email, &req.password)
        .await?;

    let password_hash = auth::hash_password(&req.password)?;
    let user = state.store.insert_user(NewUser {
        username: req.username,
        email: req.email,
        password_hash,
        remote_id: Some(remote.id),
    })?;

    info!("Registered user {} (panel id {})", user.username, remote.id);
    Ok(Json(user))
}

/// Exchange form credentials for a bearer token. No panel call is involved.
async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .store
        .find_user_by_username(&form.username)?
        .ok_or(AuthError::Unauthorized)?;

    if !auth::verify_password(&form.password, &user.password_hash)? {
        return Err(AuthError::Unauthorized.into());
    }

    if !user.is_active {
        return Err(AuthError::Unauthorized.into());
    }

    let access_token = state.auth.issue_token(&user.username)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

/// Tokens are self-contained and cannot be invalidated server-side; this
/// endpoint only acknowledges the client's intent.
async fn logout(AuthUser(_user): AuthUser) -> Json<MessageResponse> {
    Json(MessageResponse::new("Successfully logged out"))
}
