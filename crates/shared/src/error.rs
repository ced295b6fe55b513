use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Text shown when the server fails without saying why.
pub const GENERIC_FAILURE: &str = "Unexpected error occurred.";

/// Health block the API attaches to error envelopes, and to `/api/health`
/// where it carries per-zone database metrics instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbHealth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_message: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl DbHealth {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServerFailure {
    pub message: String,
}

impl ServerFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn from_health(health: Option<&DbHealth>) -> Self {
        let message = health
            .and_then(|health| health.message.as_deref())
            .filter(|message| !message.trim().is_empty())
            .unwrap_or(GENERIC_FAILURE);
        Self::new(message)
    }
}
