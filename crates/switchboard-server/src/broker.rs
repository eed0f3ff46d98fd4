//! HTTP publisher for the broker's server API.
//!
//! Each publish is one `POST {broker}/api/publish` carrying `{channel, data}`
//! and the `apikey` authorization header. Anything but `200 OK` is a
//! failure for that channel. Requests are bounded by the configured timeout
//! and never retried.

use crate::config::BrokerConfig;
use crate::metrics;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::{Duration, Instant};
use switchboard_core::{ChannelName, Message, PublishError, Publisher};
use switchboard_protocol::api::{self, PublishRequest};
use tracing::trace;

/// Publishes messages to the broker over HTTP.
pub struct HttpPublisher {
    client: Client,
    url: String,
    authorization: String,
}

impl HttpPublisher {
    /// Create a publisher for the configured broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &BrokerConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.publish_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            url: api::publish_url(&config.url),
            authorization: api::authorization_header(&config.api_key),
        })
    }

    async fn send(&self, channel: &ChannelName, message: &Message) -> Result<(), PublishError> {
        let body = PublishRequest::new(channel.as_str(), message);

        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, &self.authorization)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(channel, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                channel: channel.clone(),
                status: status.as_u16(),
                body,
            });
        }

        trace!(channel = %channel, message_id = %message.id, "Broker accepted publish");
        Ok(())
    }
}

impl fmt::Debug for HttpPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPublisher")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, channel: &ChannelName, message: &Message) -> Result<(), PublishError> {
        let start = Instant::now();
        let result = self.send(channel, message).await;
        metrics::record_publish(result.is_ok(), start.elapsed().as_secs_f64());
        result
    }
}

fn classify(channel: &ChannelName, err: reqwest::Error) -> PublishError {
    if err.is_timeout() {
        PublishError::Timeout {
            channel: channel.clone(),
        }
    } else if err.is_builder() {
        PublishError::Encode {
            channel: channel.clone(),
            reason: err.to_string(),
        }
    } else {
        PublishError::Transport {
            channel: channel.clone(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(String, Value)>>>;

    async fn publish(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (axum::http::StatusCode, String) {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let channel = body["channel"].as_str().unwrap_or_default().to_string();
        seen.lock().unwrap().push((auth, body));

        match channel.as_str() {
            "topic:fail" => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom".into()),
            "topic:slow" => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                (axum::http::StatusCode::OK, "{}".into())
            }
            _ => (axum::http::StatusCode::OK, "{}".into()),
        }
    }

    async fn spawn_broker() -> (BrokerConfig, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/api/publish", post(publish))
            .with_state(Arc::clone(&seen));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = BrokerConfig {
            url: format!("http://{}", addr),
            api_key: "test-key".to_string(),
            publish_timeout_ms: 300,
        };
        (config, seen)
    }

    #[tokio::test]
    async fn test_publish_sends_channel_data_and_key() {
        let (config, seen) = spawn_broker().await;
        let publisher = HttpPublisher::new(&config).unwrap();
        let message = Message::new("general", "hi", "alice");

        publisher
            .publish(&ChannelName::for_topic("general"), &message)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (auth, body) = &seen[0];
        assert_eq!(auth, "apikey test-key");
        assert_eq!(body["channel"], "topic:general");
        assert_eq!(body["data"]["content"], "hi");
        assert_eq!(body["data"]["author"], "alice");
        assert_eq!(body["data"]["id"], message.id.as_str());
    }

    #[tokio::test]
    async fn test_non_200_is_rejected_with_body() {
        let (config, _seen) = spawn_broker().await;
        let publisher = HttpPublisher::new(&config).unwrap();
        let channel = ChannelName::for_topic("fail");

        let err = publisher
            .publish(&channel, &Message::new("fail", "hi", "alice"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PublishError::Rejected {
                channel,
                status: 500,
                body: "boom".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_slow_broker_times_out() {
        let (config, _seen) = spawn_broker().await;
        let publisher = HttpPublisher::new(&config).unwrap();
        let channel = ChannelName::for_topic("slow");

        let err = publisher
            .publish(&channel, &Message::new("slow", "hi", "alice"))
            .await
            .unwrap_err();

        assert_eq!(err, PublishError::Timeout { channel });
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let publisher = HttpPublisher::new(&BrokerConfig {
            url: format!("http://{}", addr),
            api_key: "k".to_string(),
            publish_timeout_ms: 1_000,
        })
        .unwrap();

        let err = publisher
            .publish(
                &ChannelName::for_topic("general"),
                &Message::new("general", "hi", "alice"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Transport { .. }));
    }

    #[test]
    fn test_debug_hides_key() {
        let publisher = HttpPublisher::new(&BrokerConfig {
            url: "http://localhost:8000/".to_string(),
            api_key: "hidden".to_string(),
            publish_timeout_ms: 1_000,
        })
        .unwrap();

        let rendered = format!("{:?}", publisher);
        assert!(rendered.contains("http://localhost:8000/api/publish"));
        assert!(!rendered.contains("hidden"));
    }
}
