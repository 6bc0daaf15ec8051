//! Configuration management
//!
//! Process-wide settings come from environment variables (loaded via dotenv in
//! main). Server provisioning defaults live in a separate JSON document read
//! once at startup - every server created through this service gets the same
//! resource limits.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Panel base URL, e.g. `https://panel.example.com`
    pub panel_url: String,

    /// Panel client API key (scoped to the account the key belongs to)
    pub panel_api_key: String,

    /// Panel application/admin token (full account management scope)
    pub panel_admin_token: String,

    /// Secret used to sign bearer tokens
    pub jwt_secret: String,

    /// Bearer token lifetime in minutes
    pub token_ttl_minutes: i64,

    /// Bind address
    pub bind_addr: IpAddr,

    /// Bind port
    pub port: u16,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,

    /// Path to the provisioning defaults document
    pub defaults_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let panel_url = std::env::var("PANEL_URL")
            .context("PANEL_URL not set")?
            .trim_end_matches('/')
            .to_string();
        let panel_api_key = std::env::var("PANEL_API_KEY").context("PANEL_API_KEY not set")?;
        let panel_admin_token =
            std::env::var("PANEL_ADMIN_TOKEN").context("PANEL_ADMIN_TOKEN not set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET not set")?;

        let token_ttl_minutes = std::env::var("TOKEN_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let bind_addr = std::env::var("BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);

        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let defaults_path = std::env::var("MCHOST_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"));

        Ok(Self {
            panel_url,
            panel_api_key,
            panel_admin_token,
            jwt_secret,
            token_ttl_minutes,
            bind_addr,
            port,
            cors_origins,
            defaults_path,
        })
    }

    /// Socket address to bind the HTTP server to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

/// Provisioning defaults document (`config.json`)
#[derive(Debug, Clone, Deserialize)]
pub struct Defaults {
    pub server_config: ServerDefaults,
    pub app_config: AppDefaults,
}

/// Resource limits and container settings applied to every provisioned server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerDefaults {
    pub default_egg: i64,
    pub image: String,
    pub startup_command: String,
    #[serde(default)]
    pub environment: HashMap<String, serde_json::Value>,
    pub default_memory: i64,
    pub default_disk: i64,
    pub default_cpu: i64,
    pub default_databases: i64,
    pub default_allocations: i64,
    pub default_backups: i64,
    /// Network allocation slot assigned to new servers
    #[serde(default = "default_allocation_id")]
    pub default_allocation_id: i64,
}

fn default_allocation_id() -> i64 {
    1
}

/// Application-level policy
#[derive(Debug, Clone, Deserialize)]
pub struct AppDefaults {
    /// Maximum number of servers a single user may own
    pub max_servers_per_user: i64,
}

impl Defaults {
    /// Read and parse the defaults document
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read defaults document {}", path.display()))?;
        let defaults: Defaults = serde_json::from_str(&raw)
            .with_context(|| format!("invalid defaults document {}", path.display()))?;
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_document() {
        let raw = r#"{
            "server_config": {
                "default_egg": 5,
                "image": "ghcr.io/pterodactyl/yolks:java_17",
                "startup_command": "java -Xms128M -Xmx{{SERVER_MEMORY}}M -jar server.jar",
                "environment": {"SERVER_JARFILE": "server.jar"},
                "default_memory": 1024,
                "default_disk": 5120,
                "default_cpu": 100,
                "default_databases": 1,
                "default_allocations": 1,
                "default_backups": 1
            },
            "app_config": {
                "max_servers_per_user": 3
            }
        }"#;

        let defaults: Defaults = serde_json::from_str(raw).unwrap();
        assert_eq!(defaults.app_config.max_servers_per_user, 3);
        assert_eq!(defaults.server_config.default_memory, 1024);
        // allocation slot falls back when not present in the document
        assert_eq!(defaults.server_config.default_allocation_id, 1);
    }
}
