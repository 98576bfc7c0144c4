//! Provider trait and its HTTP implementation.

use async_trait::async_trait;

use reelgen_core::engine::EngineCaps;

use crate::error::ProviderError;
use crate::types::{
    ApiErrorBody, GenerateRequest, GenerateResponse, JobStatusResponse, PreflightRequest,
    PreflightResponse, TopUpRequest, TopUpSession, WalletBalance,
};

/// The surface the orchestrator needs from the generation service.
///
/// Implemented over HTTP in production and in-process in tests.
#[async_trait]
pub trait RenderProvider: Send + Sync {
    /// Capability declarations for every available engine.
    async fn list_engines(&self) -> Result<Vec<EngineCaps>, ProviderError>;

    /// Quote a prospective submission before anything is created.
    async fn preflight(&self, req: &PreflightRequest) -> Result<PreflightResponse, ProviderError>;

    /// Submit one iteration for generation.
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError>;

    /// Current status of a submitted job.
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ProviderError>;

    /// Current wallet balance.
    async fn wallet_balance(&self) -> Result<WalletBalance, ProviderError>;

    /// Create a checkout session for a wallet top-up.
    async fn create_topup(&self, amount_cents: i64) -> Result<TopUpSession, ProviderError>;
}

/// HTTP client for a single provider endpoint.
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpProvider {
    /// Create a client for the given base URL, e.g. `https://api.example.com/v1`.
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    // ---- private helpers ----

    /// Decode a response, turning non-2xx statuses into structured API
    /// errors. Unparseable error bodies still surface their status.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::new());
            let decoded: ApiErrorBody = serde_json::from_str(&body).unwrap_or(ApiErrorBody {
                code: None,
                message: if body.is_empty() { None } else { Some(body) },
                required_cents: None,
                balance_cents: None,
            });
            return Err(ProviderError::from_body(status.as_u16(), decoded));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RenderProvider for HttpProvider {
    async fn list_engines(&self) -> Result<Vec<EngineCaps>, ProviderError> {
        let response = self.authed(self.client.get(self.url("/engines"))).send().await?;
        Self::parse_response(response).await
    }

    async fn preflight(&self, req: &PreflightRequest) -> Result<PreflightResponse, ProviderError> {
        let response = self
            .authed(self.client.post(self.url("/preflight")))
            .json(req)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let response = self
            .authed(self.client.post(self.url("/generate")))
            .json(req)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ProviderError> {
        let response = self
            .authed(self.client.get(self.url(&format!("/jobs/{job_id}"))))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn wallet_balance(&self) -> Result<WalletBalance, ProviderError> {
        let response = self.authed(self.client.get(self.url("/wallet"))).send().await?;
        Self::parse_response(response).await
    }

    async fn create_topup(&self, amount_cents: i64) -> Result<TopUpSession, ProviderError> {
        let response = self
            .authed(self.client.post(self.url("/wallet/topup")))
            .json(&TopUpRequest { amount_cents })
            .send()
            .await?;
        Self::parse_response(response).await
    }
}
