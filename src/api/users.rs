//! User endpoints
//!
//! - `GET /api/users/profile` - own profile
//! - `PUT /api/users/profile` - update username/email/password
//! - `GET /api/users/` - list all users (admin)
//! - `DELETE /api/users/{id}` - cascade-delete a user (admin)

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::api::MessageResponse;
use crate::auth::{self, AdminUser, AuthUser};
use crate::error::ApiError;
use crate::server::AppState;
use crate::store::User;

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/{id}", axum::routing::delete(delete_user))
}

async fn get_profile(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

/// Update the caller's own username/email/password. Each supplied identity
/// field is checked against all other users first. The panel's copy of the
/// account is not updated, so its username/email drift permanently after the
/// first edit here.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(mut user): AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, ApiError> {
    if let Some(username) = &update.username {
        if username != &user.username && state.store.username_taken_by_other(username, &user.id)? {
            return Err(ApiError::Validation("Username already taken".into()));
        }
    }

    if let Some(email) = &update.email {
        if email != &user.email && state.store.email_taken_by_other(email, &user.id)? {
            return Err(ApiError::Validation("Email already taken".into()));
        }
    }

    if let Some(username) = update.username {
        user.username = username;
    }
    if let Some(email) = update.email {
        user.email = email;
    }
    if let Some(password) = update.password {
        user.password_hash = auth::hash_password(&password)?;
    }

    let updated = state.store.update_user(&user)?;
    Ok(Json(updated))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.store.list_users()?;
    Ok(Json(users))
}

/// Delete a user and all of their local server records. Neither the panel
/// account nor the panel servers are removed.
async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = state
        .store
        .find_user_by_id(&id)?
        .ok_or(ApiError::NotFound("user"))?;

    state.store.delete_user_cascading(&user.id)?;

    info!(
        "Admin {} deleted user {} and their servers",
        admin.username, user.username
    );
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
