//! Request handlers
//!
//! Orchestration of credential service, panel client, and record store.
//! Each handler validates input, performs local checks, talks to the panel
//! where required, and maps the outcome onto an HTTP response.

pub mod auth;
pub mod servers;
pub mod users;

use serde::Serialize;

/// Simple acknowledgment body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
