use async_trait::async_trait;
use shared::{
    domain::UserContext,
    error::ServerFailure,
    protocol::{
        ApiKeyCheckRequest, EntityEnvelope, EntityRequest, HealthResponse, HealthStatus,
        KeyCheckResponse, OwnershipPage, OwnershipQuery, RenewKeyResponse,
    },
};
use tracing::debug;

use crate::{
    error::ClientError,
    transport::{Answered, EndpointSet, FallbackTransport, Timeouts},
};

pub const RENDER_ONE_PATH: &str = "/api/render/one";
pub const MINT_PATH: &str = "/api/mint";
pub const NEW_ITERATION_PATH: &str = "/api/new";
pub const OWNERSHIP_PATH: &str = "/api/ownership";
pub const CHECK_API_KEY_PATH: &str = "/api/CheckAPIKey";
pub const PROFILE_PATH: &str = "/api/APIKey";
pub const RENEW_API_KEY_PATH: &str = "/api/APIKey/renew";
pub const HEALTH_PATH: &str = "/api/health";

/// Remote operations the client depends on.
#[async_trait]
pub trait OctoApi: Send + Sync {
    async fn render_one(&self, request: EntityRequest) -> Result<EntityEnvelope, ClientError>;
    async fn mint(&self, request: EntityRequest) -> Result<EntityEnvelope, ClientError>;
    async fn new_iteration(&self, request: EntityRequest) -> Result<EntityEnvelope, ClientError>;
    async fn ownership_page(&self, query: OwnershipQuery) -> Result<OwnershipPage, ClientError>;
    async fn check_api_key(&self, api_key: &str) -> Result<KeyCheckResponse, ClientError>;
    async fn profile(&self, api_key: &str) -> Result<UserContext, ClientError>;
    async fn renew_api_key(&self, api_key: &str) -> Result<RenewKeyResponse, ClientError>;
    async fn health(&self) -> Result<Answered<HealthResponse>, ClientError>;
}

/// `OctoApi` over HTTP with production-then-local fallback.
pub struct HttpOctoApi {
    transport: FallbackTransport,
    timeouts: Timeouts,
    api_key: Option<String>,
}

impl HttpOctoApi {
    pub fn new(endpoints: EndpointSet, timeouts: Timeouts, api_key: Option<String>) -> Self {
        Self {
            transport: FallbackTransport::new(endpoints),
            timeouts,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    async fn entity_call(
        &self,
        path: &str,
        request: EntityRequest,
    ) -> Result<EntityEnvelope, ClientError> {
        debug!(path, ?request, "entity request");
        let answered = self
            .transport
            .post_json(path, &request, self.api_key(), self.timeouts.entity)
            .await?;
        Ok(answered.body)
    }
}

#[async_trait]
impl OctoApi for HttpOctoApi {
    async fn render_one(&self, request: EntityRequest) -> Result<EntityEnvelope, ClientError> {
        self.entity_call(RENDER_ONE_PATH, request).await
    }

    async fn mint(&self, request: EntityRequest) -> Result<EntityEnvelope, ClientError> {
        self.entity_call(MINT_PATH, request).await
    }

    async fn new_iteration(&self, request: EntityRequest) -> Result<EntityEnvelope, ClientError> {
        self.entity_call(NEW_ITERATION_PATH, request).await
    }

    async fn ownership_page(&self, query: OwnershipQuery) -> Result<OwnershipPage, ClientError> {
        let answered = self
            .transport
            .post_json(OWNERSHIP_PATH, &query, self.api_key(), self.timeouts.account)
            .await?;
        Ok(answered.body)
    }

    async fn check_api_key(&self, api_key: &str) -> Result<KeyCheckResponse, ClientError> {
        let request = ApiKeyCheckRequest {
            api_key: api_key.to_string(),
        };
        let answered = self
            .transport
            .post_json(CHECK_API_KEY_PATH, &request, None, self.timeouts.account)
            .await?;
        Ok(answered.body)
    }

    async fn profile(&self, api_key: &str) -> Result<UserContext, ClientError> {
        let request = ApiKeyCheckRequest {
            api_key: api_key.to_string(),
        };
        let answered = self
            .transport
            .post_json(PROFILE_PATH, &request, None, self.timeouts.account)
            .await?;
        Ok(answered.body)
    }

    async fn renew_api_key(&self, api_key: &str) -> Result<RenewKeyResponse, ClientError> {
        let answered = self
            .transport
            .get_json(RENEW_API_KEY_PATH, Some(api_key), self.timeouts.account)
            .await?;
        Ok(answered.body)
    }

    async fn health(&self) -> Result<Answered<HealthResponse>, ClientError> {
        self.transport
            .get_json(HEALTH_PATH, None, self.timeouts.health)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub endpoint: String,
    pub version: String,
    pub response: HealthResponse,
}

/// Health of whichever endpoint answers first. An `ERROR` status becomes
/// an application error carrying the database message.
pub async fn check_health(api: &dyn OctoApi) -> Result<HealthReport, ClientError> {
    let answered = api.health().await?;
    if answered.body.message != HealthStatus::Ok {
        return Err(ServerFailure::from_health(answered.body.db_health.as_ref()).into());
    }
    Ok(HealthReport {
        endpoint: answered.endpoint,
        version: answered
            .body
            .version
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        response: answered.body,
    })
}
