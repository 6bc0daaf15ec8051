//! MCHost Panel API
//!
//! Account and server management layer in front of a Pterodactyl-style game
//! server panel. Users register and authenticate here; provisioning and
//! lifecycle control of the actual servers is delegated to the panel's HTTP
//! API, with local SQLite records tracking ownership.
//!
//! # Architecture
//!
//! ```text
//! Browser ──► Axum handlers ──► Panel client (reqwest) ──► Pterodactyl API
//!               │
//!               ├── Credential service (Argon2 + JWT)
//!               └── Record store (SQLite)
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod panel;
pub mod server;
pub mod store;

pub use auth::{AuthError, Claims, Keys};
pub use config::{Config, Defaults};
pub use error::ApiError;
pub use panel::{PanelApi, PanelClient, PanelError, PowerSignal, RemoteServer, RemoteUser};
pub use server::{ApiServer, AppState};
pub use store::{NewServer, NewUser, Server, Store, StoreError, User};
