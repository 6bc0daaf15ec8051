//! Server endpoints
//!
//! - `GET /api/servers/` - caller's servers
//! - `POST /api/servers/` - provision a server (panel first, then local)
//! - `GET /api/servers/{id}` - read a server, owner-scoped
//! - `DELETE /api/servers/{id}` - delete the local record, owner-scoped
//! - `POST /api/servers/{id}/start|stop|restart` - relay a power signal
//!
//! Local status is set to "installing" at creation and never refreshed; power
//! actions deliberately leave it untouched.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::api::MessageResponse;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::panel::PowerSignal;
use crate::server::AppState;
use crate::store::{NewServer, Server, User};

#[derive(Debug, Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub description: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_servers).post(create_server))
        .route("/{id}", get(get_server).delete(delete_server))
        .route("/{id}/start", post(start_server))
        .route("/{id}/stop", post(stop_server))
        .route("/{id}/restart", post(restart_server))
}

async fn list_servers(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Server>>, ApiError> {
    let servers = state.store.list_servers_for_owner(&user.id)?;
    Ok(Json(servers))
}

/// Provision a server. Quota and name checks run locally first so no panel
/// call happens for a request that cannot succeed; a panel failure fails the
/// whole operation with no local record written.
async fn create_server(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateServerRequest>,
) -> Result<Json<Server>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("server name must not be empty".into()));
    }

    let max_servers = state.defaults.app_config.max_servers_per_user;
    let owned = state.store.count_servers_for_user(&user.id)?;
    if owned >= max_servers {
        return Err(ApiError::Validation(format!(
            "You have reached the maximum number of servers ({max_servers})"
        )));
    }

    if state
        .store
        .find_server_by_owner_and_name(&user.id, &req.name)?
        .is_some()
    {
        return Err(ApiError::Validation("Server name already exists".into()));
    }

    let owner_remote_id = user
        .remote_id
        .ok_or_else(|| ApiError::Validation("account is not linked to a panel user".into()))?;

    let remote = state
        .panel
        .create_server(
            owner_remote_id,
            &req.name,
            state.defaults.server_config.default_allocation_id,
        )
        .await?;

    let server = state.store.insert_server(NewServer {
        user_id: user.id.clone(),
        remote_id: remote.id,
        name: req.name,
        description: req.description,
        status: "installing".to_string(),
    })?;

    info!(
        "User {} created server {} (panel id {})",
        user.username, server.name, remote.id
    );
    Ok(Json(server))
}

async fn get_server(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Server>, ApiError> {
    let server = find_owned(&state, &user, &id)?;
    Ok(Json(server))
}

/// Delete the local record only.
async fn delete_server(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let server = find_owned(&state, &user, &id)?;

    // TODO: also delete the server on the panel; every local delete currently
    // orphans the panel-side record.
    state.store.delete_server(&server.id)?;

    info!("User {} deleted server {}", user.username, server.name);
    Ok(Json(MessageResponse::new("Server deleted successfully")))
}

async fn start_server(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    power_action(&state, &user, &id, PowerSignal::Start).await
}

async fn stop_server(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    power_action(&state, &user, &id, PowerSignal::Stop).await
}

async fn restart_server(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    power_action(&state, &user, &id, PowerSignal::Restart).await
}

/// Relay a power signal for an owned server. The stored status is not
/// updated, so it drifts from the panel's view after any signal.
async fn power_action(
    state: &Arc<AppState>,
    user: &User,
    id: &str,
    signal: PowerSignal,
) -> Result<Json<MessageResponse>, ApiError> {
    let server = find_owned(state, user, id)?;

    if !state.panel.send_power_signal(server.remote_id, signal).await {
        return Err(ApiError::RemoteActionFailed);
    }

    Ok(Json(MessageResponse::new(format!(
        "Server {signal} command sent"
    ))))
}

/// Owner-scoped lookup; a server owned by someone else is a plain 404.
fn find_owned(state: &Arc<AppState>, user: &User, id: &str) -> Result<Server, ApiError> {
    state
        .store
        .find_server_by_id_and_owner(id, &user.id)?
        .ok_or(ApiError::NotFound("server"))
}
