//! Sequential endpoint fallback: each request goes to the first endpoint,
//! and only after that attempt goes unanswered (transport error, timeout or
//! error status) is it repeated against the next one. A success status with
//! a body that does not decode is the server's answer and ends the request.

use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::ClientError;

pub const PRODUCTION_URL: &str = "https://octo.shadowsword.ca";
pub const LOCAL_URL: &str = "http://localhost:9300";
pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub label: String,
    base_url: Url,
}

impl Endpoint {
    pub fn new(label: impl Into<String>, raw_url: &str) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(raw_url.trim()).map_err(|source| {
            ClientError::InvalidEndpoint {
                url: raw_url.to_string(),
                source,
            }
        })?;
        // Paths are joined relative to the base, so it must end in a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            label: label.into(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn join(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| ClientError::InvalidEndpoint {
                url: format!("{}{path}", self.base_url),
                source,
            })
    }
}

/// Endpoints in the order they are tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    pub fn production_then_local() -> Result<Self, ClientError> {
        Ok(Self::new(vec![
            Endpoint::new("production", PRODUCTION_URL)?,
            Endpoint::new("local", LOCAL_URL)?,
        ]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Per-attempt timeouts by request family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub entity: Duration,
    pub account: Duration,
    pub health: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            entity: Duration::from_millis(1500),
            account: Duration::from_millis(2000),
            health: Duration::from_millis(3000),
        }
    }
}

/// A decoded response together with the endpoint that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Answered<T> {
    pub endpoint: String,
    pub body: T,
}

#[derive(Debug, Clone)]
pub struct FallbackTransport {
    http: Client,
    endpoints: EndpointSet,
}

impl FallbackTransport {
    pub fn new(endpoints: EndpointSet) -> Self {
        Self {
            http: Client::new(),
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Answered<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_with_fallback(path, |http, url| {
            with_api_key(http.post(url).json(body).timeout(timeout), api_key)
        })
        .await
    }

    pub async fn get_json<T>(
        &self,
        path: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Answered<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        self.send_with_fallback(path, |http, url| {
            with_api_key(http.get(url).timeout(timeout), api_key)
        })
        .await
    }

    async fn send_with_fallback<T, F>(&self, path: &str, build: F) -> Result<Answered<T>, ClientError>
    where
        T: DeserializeOwned,
        F: Fn(&Client, Url) -> RequestBuilder,
    {
        let mut attempts = Vec::with_capacity(self.endpoints.len());
        for endpoint in self.endpoints.iter() {
            let url = endpoint.join(path)?;
            match attempt::<T>(build(&self.http, url)).await {
                Ok(body) => {
                    info!(endpoint = %endpoint.label, path, "api request answered");
                    return Ok(Answered {
                        endpoint: endpoint.label.clone(),
                        body,
                    });
                }
                Err(AttemptFailure::Undecodable(err)) => {
                    warn!(endpoint = %endpoint.label, path, error = %err, "api answered with undecodable body");
                    return Err(ClientError::MalformedResponse { field: "body" });
                }
                Err(AttemptFailure::Unanswered(err)) => {
                    let detail = format!("{err:#}");
                    warn!(endpoint = %endpoint.label, path, error = %detail, "api attempt failed");
                    attempts.push(format!("{}: {detail}", endpoint.label));
                }
            }
        }
        Err(ClientError::Unreachable { attempts })
    }
}

fn with_api_key(builder: RequestBuilder, api_key: Option<&str>) -> RequestBuilder {
    match api_key.filter(|key| !key.is_empty()) {
        Some(key) => builder.header(API_KEY_HEADER, key),
        None => builder,
    }
}

/// Only `Unanswered` moves on to the next endpoint.
enum AttemptFailure {
    Unanswered(anyhow::Error),
    Undecodable(serde_json::Error),
}

async fn attempt<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, AttemptFailure> {
    let body = receive(builder).await.map_err(AttemptFailure::Unanswered)?;
    serde_json::from_str(&body).map_err(AttemptFailure::Undecodable)
}

async fn receive(builder: RequestBuilder) -> anyhow::Result<String> {
    let response = builder
        .send()
        .await
        .context("request failed")?
        .error_for_status()
        .context("server returned error status")?;
    response.text().await.context("failed to read response body")
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
