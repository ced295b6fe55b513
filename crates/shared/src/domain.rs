use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(EntityIndex);

/// Number of spatial partitions the API accepts (`zone` in `0..ZONE_COUNT`).
pub const ZONE_COUNT: u8 = 8;
/// `state` code carried by client-synthesized placeholders.
pub const PENDING_STATE: i64 = -1;
pub const PENDING_NAME_SUFFIX: &str = " (pending)";
/// Identity the API reports for requests without a usable key.
pub const NIL_ACCOUNT_ID: &str = "00000000-0000-0000-0000-000000000001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
    pub zone: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aesthetics {
    /// Color channels, `channel_0` through `channel_7`.
    #[serde(default)]
    pub bar: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub glyphs: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Aesthetics {
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.bar.values().map(String::as_str)
    }
}

/// One iteration of an entity as the API serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    #[serde(default)]
    pub index: Option<EntityIndex>,
    pub iter: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uuid: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(rename = "positionX", default, deserialize_with = "null_as_default")]
    pub position_x: u32,
    #[serde(rename = "positionY", default, deserialize_with = "null_as_default")]
    pub position_y: u32,
    #[serde(rename = "positionZ", default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<u8>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub aesthetics: Aesthetics,
    #[serde(default)]
    pub ownership: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub minted: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exists: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: f64,
}

/// Entity columns are nullable in the store; a `null` reads as the
/// field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl EntitySnapshot {
    /// The API omits `positionZ` on some routes; the caller supplies the
    /// zone the entity was requested from.
    pub fn position(&self, fallback_zone: u8) -> Position {
        Position {
            x: self.position_x,
            y: self.position_y,
            zone: self.zone.unwrap_or(fallback_zone),
        }
    }

    /// Copy of this snapshot standing in for `next_iter` until the server
    /// confirms it. The server assigns a fresh index on commit.
    pub fn placeholder_for(&self, next_iter: u32) -> Self {
        let mut placeholder = self.clone();
        placeholder.index = None;
        placeholder.iter = next_iter;
        placeholder.minted = false;
        placeholder.exists = false;
        placeholder.state = PENDING_STATE;
        placeholder.name = format!("{}{PENDING_NAME_SUFFIX}", self.name);
        placeholder
    }

    pub fn is_owned_by(&self, user: &UserContext) -> bool {
        self.ownership.as_deref() == Some(user.id.as_str())
    }

    /// Whether the mint action may be offered to `user`. The server remains
    /// the final authority.
    pub fn mintable_by(&self, user: &UserContext) -> bool {
        user.decryption_success && self.is_owned_by(user) && !self.minted
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp.is_finite() || self.timestamp <= 0.0 {
            return None;
        }
        let secs = self.timestamp.trunc() as i64;
        let nanos = (self.timestamp.fract() * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    /// Elapsed time since creation as `Xd:Xh:Xm:Xs`.
    pub fn age_label(&self, now: DateTime<Utc>) -> String {
        let Some(created) = self.created_at() else {
            return "--:--:--:--".to_string();
        };
        let secs = (now - created).num_seconds().max(0);
        format!(
            "{}d:{}h:{}m:{}s",
            secs / 86_400,
            (secs % 86_400) / 3_600,
            (secs % 3_600) / 60,
            secs % 60
        )
    }
}

/// Identity the API derives from the `X-API-Key` it was sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    #[serde(default)]
    pub decryption_success: bool,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub days_old: i64,
    #[serde(rename = "ID", default)]
    pub id: String,
}

impl Default for UserContext {
    fn default() -> Self {
        Self {
            decryption_success: false,
            data: Vec::new(),
            days_old: 0,
            id: NIL_ACCOUNT_ID.to_string(),
        }
    }
}

impl UserContext {
    pub fn short_id(&self) -> &str {
        self.id.split('-').next().unwrap_or_default()
    }
}
