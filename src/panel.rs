//! Remote Panel Client
//!
//! Typed wrapper around the Pterodactyl-style panel HTTP API. Each operation
//! is exactly one HTTP call with a bounded timeout and no retry; the panel's
//! response codes decide success.
//!
//! Two credentials are in play: the application ("admin") token for account
//! and server management, and the client key scoped to whatever account the
//! key belongs to (listing, status, power signals). Which one an operation
//! uses is fixed here, not chosen by the caller.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{Config, ServerDefaults};

/// Timeout for reads and power signals
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for server creation (panel-side install kickoff is slow)
const CREATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Panel call failures. Transient and permanent causes are not distinguished
/// to callers; the detail lands in the log.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("panel request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("panel returned {status}")]
    Status { status: StatusCode, body: String },
}

/// Power signals accepted by the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSignal {
    Start,
    Stop,
    Restart,
}

impl fmt::Display for PowerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerSignal::Start => write!(f, "start"),
            PowerSignal::Stop => write!(f, "stop"),
            PowerSignal::Restart => write!(f, "restart"),
        }
    }
}

/// Panel-side user as returned by the application API
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteUser {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// Panel-side server as returned by the application/client APIs
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteServer {
    pub id: i64,
    pub name: String,
    /// Short client-API identifier; absent on application-API responses
    #[serde(default)]
    pub identifier: Option<String>,
}

/// Panel responses wrap the payload in an `attributes` object
#[derive(Debug, Deserialize)]
struct Wrapped<T> {
    attributes: T,
}

#[derive(Debug, Deserialize)]
struct WrappedList<T> {
    data: Vec<Wrapped<T>>,
}

/// The panel operations handlers depend on. Split out as a trait so tests can
/// substitute a double for the HTTP client.
#[async_trait]
pub trait PanelApi: Send + Sync {
    /// Create a panel account. Succeeds only on 201.
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RemoteUser, PanelError>;

    /// Fetch a panel account by id.
    async fn get_user(&self, id: i64) -> Result<RemoteUser, PanelError>;

    /// Provision a server for the given panel account, using the process-wide
    /// resource defaults. Succeeds only on 201.
    async fn create_server(
        &self,
        owner_remote_id: i64,
        name: &str,
        allocation_id: i64,
    ) -> Result<RemoteServer, PanelError>;

    /// List servers visible to the client key's own account.
    async fn list_own_servers(&self) -> Result<Vec<RemoteServer>, PanelError>;

    /// Fetch live server details from the client API.
    async fn server_status(&self, remote_id: i64) -> Result<serde_json::Value, PanelError>;

    /// Relay a power signal. True only on 204; any other outcome, including
    /// transport errors, is false.
    async fn send_power_signal(&self, remote_id: i64, signal: PowerSignal) -> bool;
}

/// reqwest-backed panel client
pub struct PanelClient {
    http: Client,
    base_url: String,
    api_key: String,
    admin_token: String,
    defaults: ServerDefaults,
}

impl PanelClient {
    pub fn new(config: &Config, defaults: ServerDefaults) -> Self {
        Self {
            http: Client::new(),
            base_url: config.panel_url.clone(),
            api_key: config.panel_api_key.clone(),
            admin_token: config.panel_admin_token.clone(),
            defaults,
        }
    }

    fn authed(&self, req: RequestBuilder, admin: bool) -> RequestBuilder {
        let token = if admin { &self.admin_token } else { &self.api_key };
        req.bearer_auth(token)
            .header("Accept", "application/json")
    }

    /// Read the body and fail on a non-expected status, logging the detail.
    async fn expect_status<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        expected: StatusCode,
        context: &str,
    ) -> Result<T, PanelError> {
        let status = response.status();
        if status != expected {
            let body = response.text().await.unwrap_or_default();
            warn!("{context}: panel returned {status}: {body}");
            return Err(PanelError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PanelApi for PanelClient {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RemoteUser, PanelError> {
        let url = format!("{}/api/application/users", self.base_url);
        let body = json!({
            "username": username,
            "email": email,
            "first_name": username,
            "last_name": "User",
            "password": password,
        });

        debug!("Creating panel user {username}");
        let response = self
            .authed(self.http.post(&url), true)
            .timeout(READ_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let user: Wrapped<RemoteUser> =
            Self::expect_status(response, StatusCode::CREATED, "create_user").await?;
        Ok(user.attributes)
    }

    async fn get_user(&self, id: i64) -> Result<RemoteUser, PanelError> {
        let url = format!("{}/api/application/users/{id}", self.base_url);
        let response = self
            .authed(self.http.get(&url), true)
            .timeout(READ_TIMEOUT)
            .send()
            .await?;

        let user: Wrapped<RemoteUser> =
            Self::expect_status(response, StatusCode::OK, "get_user").await?;
        Ok(user.attributes)
    }

    async fn create_server(
        &self,
        owner_remote_id: i64,
        name: &str,
        allocation_id: i64,
    ) -> Result<RemoteServer, PanelError> {
        let url = format!("{}/api/application/servers", self.base_url);
        let cfg = &self.defaults;
        let body = json!({
            "name": name,
            "user": owner_remote_id,
            "egg": cfg.default_egg,
            "docker_image": cfg.image,
            "startup": cfg.startup_command,
            "environment": cfg.environment,
            "limits": {
                "memory": cfg.default_memory,
                "swap": 0,
                "disk": cfg.default_disk,
                "io": 500,
                "cpu": cfg.default_cpu,
            },
            "feature_limits": {
                "databases": cfg.default_databases,
                "allocations": cfg.default_allocations,
                "backups": cfg.default_backups,
            },
            "allocation": {
                "default": allocation_id,
            },
        });

        debug!("Creating panel server {name} for panel user {owner_remote_id}");
        let response = self
            .authed(self.http.post(&url), true)
            .timeout(CREATE_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let server: Wrapped<RemoteServer> =
            Self::expect_status(response, StatusCode::CREATED, "create_server").await?;
        Ok(server.attributes)
    }

    async fn list_own_servers(&self) -> Result<Vec<RemoteServer>, PanelError> {
        // Client key scope: lists whatever the key's account can see, not a
        // specific end user's servers.
        let url = format!("{}/api/client", self.base_url);
        let response = self
            .authed(self.http.get(&url), false)
            .timeout(READ_TIMEOUT)
            .send()
            .await?;

        let servers: WrappedList<RemoteServer> =
            Self::expect_status(response, StatusCode::OK, "list_own_servers").await?;
        Ok(servers.data.into_iter().map(|w| w.attributes).collect())
    }

    async fn server_status(&self, remote_id: i64) -> Result<serde_json::Value, PanelError> {
        let url = format!("{}/api/client/servers/{remote_id}", self.base_url);
        let response = self
            .authed(self.http.get(&url), false)
            .timeout(READ_TIMEOUT)
            .send()
            .await?;

        Self::expect_status(response, StatusCode::OK, "server_status").await
    }

    async fn send_power_signal(&self, remote_id: i64, signal: PowerSignal) -> bool {
        let url = format!("{}/api/client/servers/{remote_id}/power", self.base_url);
        let body = json!({ "signal": signal });

        let result = self
            .authed(self.http.post(&url), false)
            .timeout(READ_TIMEOUT)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::NO_CONTENT => true,
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!("Power signal {signal} for panel server {remote_id} rejected: {status}: {body}");
                false
            }
            Err(e) => {
                error!("Power signal {signal} for panel server {remote_id} failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_signal_wire_names() {
        assert_eq!(PowerSignal::Start.to_string(), "start");
        assert_eq!(PowerSignal::Stop.to_string(), "stop");
        assert_eq!(PowerSignal::Restart.to_string(), "restart");
    }

    #[test]
    fn test_remote_user_unwrapping() {
        let raw = r#"{"object":"user","attributes":{"id":42,"username":"alice","email":"a@x.com","root_admin":false}}"#;
        let user: Wrapped<RemoteUser> = serde_json::from_str(raw).unwrap();
        assert_eq!(user.attributes.id, 42);
        assert_eq!(user.attributes.username, "alice");
    }

    #[test]
    fn test_client_list_unwrapping() {
        let raw = r#"{"object":"list","data":[
            {"object":"server","attributes":{"id":100,"name":"survival","identifier":"a1b2c3"}},
            {"object":"server","attributes":{"id":101,"name":"creative"}}
        ]}"#;
        let list: WrappedList<RemoteServer> = serde_json::from_str(raw).unwrap();
        assert_eq!(list.data.len(), 2);
        assert_eq!(list.data[0].attributes.identifier.as_deref(), Some("a1b2c3"));
        assert!(list.data[1].attributes.identifier.is_none());
    }
}
