use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{EntityIndex, EntitySnapshot, Position, UserContext},
    error::{DbHealth, ServerFailure},
};

/// Iteration number to snapshot, as returned in the `entity` field.
pub type VersionMap = BTreeMap<u32, EntitySnapshot>;

/// Body shared by render-one, mint and new-iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRequest {
    pub x_pos: u32,
    pub y_pos: u32,
    pub zone: u8,
    pub iter: u32,
}

impl EntityRequest {
    pub fn new(position: Position, iter: u32) -> Self {
        Self {
            x_pos: position.x,
            y_pos: position.y,
            zone: position.zone,
            iter,
        }
    }
}

/// Response of the entity routes. Error responses carry only `message`
/// and `db_health`, so every payload field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<VersionMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intended_iter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iter_is_latest: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<UserContext>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub banner: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_health: Option<DbHealth>,
}

impl EntityEnvelope {
    /// `intended_iter` when it is a finite, non-negative, integral number.
    /// Numeric strings are accepted.
    pub fn intended_iter(&self) -> Option<u32> {
        let raw = match self.intended_iter.as_ref()? {
            Value::Number(number) => number.as_f64()?,
            Value::String(text) => text.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if raw.is_finite() && raw >= 0.0 && raw.fract() == 0.0 && raw <= f64::from(u32::MAX) {
            Some(raw as u32)
        } else {
            None
        }
    }

    /// The version map, or the server's explanation of why it is missing.
    pub fn versions(&self) -> Result<&VersionMap, ServerFailure> {
        self.entity
            .as_ref()
            .ok_or_else(|| ServerFailure::from_health(self.db_health.as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipQuery {
    pub ownership: String,
    pub zone: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_index: Option<EntityIndex>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnershipPage {
    #[serde(default)]
    pub rows: Vec<EntitySnapshot>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<EntityIndex>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyCheckRequest {
    #[serde(rename = "APIKey")]
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyCheckResponse {
    #[serde(default)]
    pub valid_key: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenewKeyResponse {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub message: HealthStatus,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub application_ts: Option<Value>,
    #[serde(default)]
    pub db_health: Option<DbHealth>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
