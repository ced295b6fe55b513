//! Login, profile and ownership flows keyed by an `X-API-Key`.

use shared::{
    domain::{EntitySnapshot, UserContext},
    protocol::OwnershipQuery,
};
use tracing::{info, warn};

use crate::{api::OctoApi, error::ClientError};

/// Keys older than a year are refused by the API.
pub const KEY_LIFETIME_DAYS: i64 = 365;
pub const RENEWAL_WARNING_PERCENT: u8 = 75;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub id: String,
    pub short_id: String,
    pub days_old: i64,
    pub age_percent: u8,
}

impl AccountSummary {
    pub fn needs_renewal(&self) -> bool {
        self.age_percent >= RENEWAL_WARNING_PERCENT
    }
}

impl From<&UserContext> for AccountSummary {
    fn from(user: &UserContext) -> Self {
        let days_old = user.days_old.max(0);
        let age_percent = (days_old * 100 / KEY_LIFETIME_DAYS).min(100) as u8;
        Self {
            id: user.id.clone(),
            short_id: user.short_id().to_string(),
            days_old,
            age_percent,
        }
    }
}

fn require_key(api_key: &str) -> Result<&str, ClientError> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(ClientError::MissingApiKey);
    }
    Ok(api_key)
}

/// Whether the API accepts `api_key`.
pub async fn login(api: &dyn OctoApi, api_key: &str) -> Result<bool, ClientError> {
    let api_key = require_key(api_key)?;
    let response = api.check_api_key(api_key).await?;
    info!(valid = response.valid_key, "api key checked");
    Ok(response.valid_key)
}

/// Identity behind `api_key`. A key the API cannot decrypt is
/// `Unauthorized`.
pub async fn load_profile(api: &dyn OctoApi, api_key: &str) -> Result<UserContext, ClientError> {
    let api_key = require_key(api_key)?;
    let user = api.profile(api_key).await?;
    if !user.decryption_success {
        warn!("profile request rejected the api key");
        return Err(ClientError::Unauthorized);
    }
    Ok(user)
}

pub async fn renew_key(api: &dyn OctoApi, api_key: &str) -> Result<String, ClientError> {
    let api_key = require_key(api_key)?;
    api.renew_api_key(api_key)
        .await?
        .api_key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ClientError::Application {
            message: "Unexpected Error.".to_string(),
        })
}

/// Every entity `ownership` holds in `zone`, following `next_cursor`
/// until the API reports no more pages.
pub async fn owned_entities(
    api: &dyn OctoApi,
    ownership: &str,
    zone: u8,
) -> Result<Vec<EntitySnapshot>, ClientError> {
    let mut rows = Vec::new();
    let mut after_index = None;
    loop {
        let page = api
            .ownership_page(OwnershipQuery {
                ownership: ownership.to_string(),
                zone,
                after_index,
            })
            .await?;
        rows.extend(page.rows);
        if !page.has_more {
            break;
        }
        // A cursor that does not advance would loop forever.
        match page.next_cursor {
            Some(cursor) if Some(cursor) != after_index => after_index = Some(cursor),
            _ => {
                return Err(ClientError::MalformedResponse {
                    field: "next_cursor",
                })
            }
        }
    }
    Ok(rows)
}
