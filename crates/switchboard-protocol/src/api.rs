//! Broker publish API.
//!
//! The relay pushes every message through a single HTTP endpoint on the
//! broker, authenticated with a static API key.

use serde::{Deserialize, Serialize};

/// Path of the publish endpoint, relative to the broker base URL.
pub const PUBLISH_PATH: &str = "/api/publish";

/// Scheme used in the `Authorization` header for API key auth.
pub const API_KEY_SCHEME: &str = "apikey";

/// Body of a publish call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest<T> {
    /// Target channel name.
    pub channel: String,
    /// Payload delivered verbatim to every subscriber of the channel.
    pub data: T,
}

impl<T> PublishRequest<T> {
    /// Create a new publish request.
    #[must_use]
    pub fn new(channel: impl Into<String>, data: T) -> Self {
        Self {
            channel: channel.into(),
            data,
        }
    }
}

/// Build the full publish URL for a broker base URL.
#[must_use]
pub fn publish_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), PUBLISH_PATH)
}

/// Build the `Authorization` header value for an API key.
#[must_use]
pub fn authorization_header(api_key: &str) -> String {
    format!("{API_KEY_SCHEME} {api_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_url_trims_trailing_slash() {
        assert_eq!(
            publish_url("http://localhost:8000/"),
            "http://localhost:8000/api/publish"
        );
        assert_eq!(
            publish_url("http://broker:8000"),
            "http://broker:8000/api/publish"
        );
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(authorization_header("secret"), "apikey secret");
    }

    #[test]
    fn test_publish_request_shape() {
        let req = PublishRequest::new("topic:general", serde_json::json!({"content": "hi"}));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"channel": "topic:general", "data": {"content": "hi"}})
        );
    }
}
