use std::{collections::HashMap, fs, io, path::Path, time::Duration};

use anyhow::Context;
use client_core::{
    transport::{Endpoint, EndpointSet, Timeouts, LOCAL_URL, PRODUCTION_URL},
    ClientError,
};

pub const DEFAULT_CONFIG_PATH: &str = "octo.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub primary_url: String,
    /// `None` (or an empty value in config) disables the fallback hop.
    pub fallback_url: Option<String>,
    pub api_key: Option<String>,
    pub entity_timeout_ms: u64,
    pub account_timeout_ms: u64,
    pub health_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            primary_url: PRODUCTION_URL.into(),
            fallback_url: Some(LOCAL_URL.into()),
            api_key: None,
            entity_timeout_ms: 1500,
            account_timeout_ms: 2000,
            health_timeout_ms: 3000,
        }
    }
}

impl Settings {
    pub fn endpoint_set(&self) -> Result<EndpointSet, ClientError> {
        let mut endpoints = vec![Endpoint::new("primary", &self.primary_url)?];
        if let Some(url) = &self.fallback_url {
            endpoints.push(Endpoint::new("fallback", url)?);
        }
        Ok(EndpointSet::new(endpoints))
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            entity: Duration::from_millis(self.entity_timeout_ms),
            account: Duration::from_millis(self.account_timeout_ms),
            health: Duration::from_millis(self.health_timeout_ms),
        }
    }

    pub fn set_api_key(&mut self, raw: String) {
        self.api_key = non_empty(raw);
    }
}

/// Defaults, then `path` if it exists, then the process environment.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    apply_env(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg = toml::from_str::<HashMap<String, String>>(raw)?;

    if let Some(v) = file_cfg.get("primary_url") {
        settings.primary_url = v.clone();
    }
    if let Some(v) = file_cfg.get("fallback_url") {
        settings.fallback_url = non_empty(v.clone());
    }
    if let Some(v) = file_cfg.get("api_key") {
        settings.api_key = non_empty(v.clone());
    }
    if let Some(v) = file_cfg.get("entity_timeout_ms") {
        settings.entity_timeout_ms = parse_millis("entity_timeout_ms", v)?;
    }
    if let Some(v) = file_cfg.get("account_timeout_ms") {
        settings.account_timeout_ms = parse_millis("account_timeout_ms", v)?;
    }
    if let Some(v) = file_cfg.get("health_timeout_ms") {
        settings.health_timeout_ms = parse_millis("health_timeout_ms", v)?;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("OCTO_PRIMARY_URL") {
        settings.primary_url = v;
    }
    if let Some(v) = var("APP__PRIMARY_URL") {
        settings.primary_url = v;
    }

    if let Some(v) = var("OCTO_FALLBACK_URL") {
        settings.fallback_url = non_empty(v);
    }
    if let Some(v) = var("APP__FALLBACK_URL") {
        settings.fallback_url = non_empty(v);
    }

    if let Some(v) = var("OCTO_API_KEY") {
        settings.api_key = non_empty(v);
    }
    if let Some(v) = var("APP__API_KEY") {
        settings.api_key = non_empty(v);
    }

    // Unparsable values keep the previous setting.
    if let Some(parsed) = var("APP__ENTITY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        settings.entity_timeout_ms = parsed;
    }
    if let Some(parsed) = var("APP__ACCOUNT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        settings.account_timeout_ms = parsed;
    }
    if let Some(parsed) = var("APP__HEALTH_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        settings.health_timeout_ms = parsed;
    }
}

fn parse_millis(key: &str, raw: &str) -> anyhow::Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("'{key}' must be a whole number of milliseconds, got '{raw}'"))
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
