//! HTTP client for the relay API.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchboard_core::Message;
use thiserror::Error;
use tracing::debug;

/// Timeout applied to every relay request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when talking to the relay.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Relay returned {status}: {error}")]
    Status { status: u16, error: String },
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    user: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    topic: &'a str,
    content: &'a str,
    author: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    success: bool,
    message: Message,
}

#[derive(Deserialize)]
struct TopicsResponse {
    topics: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Source of connection credentials for a user.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch a signed credential for `user`.
    async fn fetch_credential(&self, user: &str) -> Result<String, ApiError>;
}

/// Relay API client.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    /// Create a client for the relay at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// The relay base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read<R: DeserializeOwned>(response: Response) -> Result<R, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let error = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(ApiError::Status {
                status: status.as_u16(),
                error,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Request a connection token for `user`.
    pub async fn fetch_token(&self, user: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url("/api/token"))
            .json(&TokenRequest { user })
            .send()
            .await?;

        let body: TokenResponse = Self::read(response).await?;
        debug!(user = %user, "Fetched connection token");
        Ok(body.token)
    }

    /// Send a message through the relay. Returns the message as stamped by
    /// the relay.
    pub async fn send_message(
        &self,
        topic: &str,
        content: &str,
        author: &str,
    ) -> Result<Message, ApiError> {
        let response = self
            .client
            .post(self.url("/api/messages"))
            .json(&SendRequest {
                topic,
                content,
                author,
            })
            .send()
            .await?;

        let body: SendResponse = Self::read(response).await?;
        if !body.success {
            return Err(ApiError::Parse("Relay reported an unsuccessful send".into()));
        }
        Ok(body.message)
    }

    /// The relay's topic catalog.
    pub async fn topics(&self) -> Result<Vec<String>, ApiError> {
        let response = self.client.get(self.url("/api/topics")).send().await?;
        let body: TopicsResponse = Self::read(response).await?;
        Ok(body.topics)
    }
}

#[async_trait]
impl CredentialSource for RelayClient {
    async fn fetch_credential(&self, user: &str) -> Result<String, ApiError> {
        self.fetch_token(user).await
    }
}
