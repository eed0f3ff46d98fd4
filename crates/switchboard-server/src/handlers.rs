//! HTTP handlers for the switchboard relay.
//!
//! This module wires the credential issuer and the message router to the
//! relay's HTTP surface.

use crate::broker::HttpPublisher;
use crate::config::{Config, CorsConfig};
use crate::metrics;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{
    topic::is_aggregate, CredentialIssuer, Message, MessageRouter, Publisher, RouteError,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The message router.
    pub router: MessageRouter<Arc<dyn Publisher>>,
    /// Signs connection credentials.
    pub issuer: CredentialIssuer,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create app state publishing to the configured broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the publisher, catalog, or issuer cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let publisher =
            HttpPublisher::new(&config.broker).context("Failed to build broker client")?;
        Self::with_publisher(config, Arc::new(publisher))
    }

    /// Create app state over an explicit publisher.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or issuer cannot be built.
    pub fn with_publisher(config: Config, publisher: Arc<dyn Publisher>) -> Result<Self> {
        let catalog = config.catalog()?;
        let issuer = CredentialIssuer::new(
            config.token.hmac_secret.as_bytes(),
            Duration::from_secs(config.token.ttl_secs),
        )
        .context("Failed to create credential issuer")?;

        Ok(Self {
            router: MessageRouter::new(publisher, catalog),
            issuer,
            config,
        })
    }
}

/// Errors returned to API callers as `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request format")]
    InvalidRequest(#[from] JsonRejection),
    #[error("User is required")]
    MissingUser,
    #[error("Failed to generate token")]
    TokenSigning,
    #[error("Topic, content, and author are required")]
    InvalidMessage,
    #[error("Failed to send message")]
    PublishFailed,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::MissingUser | ApiError::InvalidMessage => {
                StatusCode::BAD_REQUEST
            }
            ApiError::TokenSigning | ApiError::PublishFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::MissingUser | ApiError::InvalidMessage => "validation",
            ApiError::TokenSigning => "token_signing",
            ApiError::PublishFailed => "publish",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        metrics::record_error(self.kind());
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    #[serde(default)]
    user: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    author: String,
}

#[derive(Debug, Serialize)]
struct SendResponse {
    success: bool,
    message: Message,
}

#[derive(Debug, Serialize)]
struct TopicsResponse<'a> {
    topics: &'a [String],
}

/// Build the HTTP application.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/api/token", post(token_handler))
        .route("/api/messages", post(send_message_handler))
        .route("/api/topics", get(topics_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Run the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config)?);
    let app = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Switchboard relay listening on {}", addr);
    info!(
        broker = %state.config.broker.url,
        topics = ?state.router.catalog().topics(),
        "Relaying to broker"
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "time": Utc::now(),
        "broker_url": state.config.broker.url,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn token_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;

    let credential = state.issuer.issue(&request.user).map_err(|e| {
        if e.is_validation() {
            ApiError::MissingUser
        } else {
            error!(user = %request.user, error = %e, "Failed to sign token");
            ApiError::TokenSigning
        }
    })?;

    metrics::record_token_issued();
    debug!(user = %request.user, expires = credential.claims.exp, "Issued token");
    Ok(Json(TokenResponse {
        token: credential.token,
    }))
}

async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(request) = payload?;

    let message = state
        .router
        .route(&request.topic, &request.content, &request.author)
        .await
        .map_err(|e| match e {
            RouteError::Validation(_) => ApiError::InvalidMessage,
            RouteError::Publish(err) => {
                error!(topic = %request.topic, error = %err, "Failed to send message");
                ApiError::PublishFailed
            }
        })?;

    let kind = if is_aggregate(&message.topic) {
        "aggregate"
    } else {
        "topic"
    };
    metrics::record_message_routed(kind);

    Ok(Json(SendResponse {
        success: true,
        message,
    }))
}

async fn topics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(TopicsResponse {
        topics: state.router.catalog().topics(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use switchboard_core::{ChannelName, PublishError};
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingPublisher {
        channels: Mutex<Vec<String>>,
        failing: HashSet<String>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(
            &self,
            channel: &ChannelName,
            _message: &Message,
        ) -> Result<(), PublishError> {
            self.channels.lock().unwrap().push(channel.to_string());
            if self.failing.contains(channel.as_str()) {
                return Err(PublishError::Rejected {
                    channel: channel.clone(),
                    status: 503,
                    body: String::new(),
                });
            }
            Ok(())
        }
    }

    fn app(failing: &[&str]) -> (Router, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher {
            channels: Mutex::new(Vec::new()),
            failing: failing.iter().map(|c| (*c).to_string()).collect(),
        });
        let state = AppState::with_publisher(Config::default(), publisher.clone()).unwrap();
        (build_router(Arc::new(state)), publisher)
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_token_issued() {
        let (app, _) = app(&[]);

        let (status, body) = call(app, post_json("/api/token", r#"{"user":"alice"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[tokio::test]
    async fn test_token_requires_user() {
        let (app, _) = app(&[]);

        let (status, body) = call(app, post_json("/api/token", r#"{"user":""}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "User is required"}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_request() {
        let (app, _) = app(&[]);

        let (status, body) = call(app, post_json("/api/messages", "{not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Invalid request format"}));
    }

    #[tokio::test]
    async fn test_send_to_topic_publishes_and_mirrors() {
        let (app, publisher) = app(&[]);

        let (status, body) = call(
            app,
            post_json(
                "/api/messages",
                r#"{"topic":"general","content":"hi","author":"alice"}"#,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"]["topic"], "general");
        assert_eq!(body["message"]["content"], "hi");
        assert_eq!(body["message"]["author"], "alice");
        assert!(!body["message"]["id"].as_str().unwrap().is_empty());
        assert!(body["message"]["timestamp"].is_string());
        assert_eq!(
            *publisher.channels.lock().unwrap(),
            vec!["topic:general", "topic:all"]
        );
    }

    #[tokio::test]
    async fn test_send_validation_error() {
        let (app, publisher) = app(&[]);

        let (status, body) = call(
            app,
            post_json("/api/messages", r#"{"topic":"general","content":"","author":"alice"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Topic, content, and author are required"}));
        assert!(publisher.channels.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_fails_when_topic_channel_fails() {
        let (app, _) = app(&["topic:tech"]);

        let (status, body) = call(
            app,
            post_json("/api/messages", r#"{"topic":"tech","content":"hi","author":"bob"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to send message"}));
    }

    #[tokio::test]
    async fn test_aggregate_send_succeeds_despite_failures() {
        let (app, publisher) = app(&["topic:general", "topic:tech"]);

        let (status, body) = call(
            app,
            post_json("/api/messages", r#"{"topic":"all","content":"hi","author":"bob"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(publisher.channels.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_topics_and_health() {
        let (app, _) = app(&[]);

        let (status, body) = call(app.clone(), get_request("/api/topics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"topics": ["all", "general", "tech", "random", "announcements"]})
        );

        let (status, body) = call(app, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert!(body["broker_url"].is_string());
        assert!(body["time"].is_string());
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let (app, _) = app(&[]);

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/messages")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "http://localhost:5173"
        );
    }
}
