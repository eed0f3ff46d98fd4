//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (SWITCHBOARD_*, plus PORT and the legacy
//!   CENTRIFUGO_URL, CENTRIFUGO_API_KEY, CENTRIFUGO_TOKEN_HMAC_SECRET_KEY)
//! - TOML configuration file
//! - Nested environment overrides (SWITCHBOARD__BROKER__URL, ...)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use switchboard_core::TopicCatalog;
use tracing::info;

/// Candidate configuration files, first existing one wins.
const CONFIG_PATHS: [&str; 3] = [
    "switchboard.toml",
    "/etc/switchboard/switchboard.toml",
    "~/.config/switchboard/switchboard.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Broker connection.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Credential signing.
    #[serde(default)]
    pub token: TokenConfig,

    /// Topic catalog, aggregate topic included.
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Cross-origin policy.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Broker connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker base URL.
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Key sent with every publish.
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// Per-publish timeout in milliseconds.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,
}

/// Credential signing configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Shared HMAC secret.
    #[serde(default = "default_token_secret")]
    pub hmac_secret: String,

    /// Credential lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub ttl_secs: u64,
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to call the API.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// First of `names` set in the environment.
fn env_first(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| std::env::var(name).ok())
}

// Default value functions
fn default_host() -> String {
    env_first(&["SWITCHBOARD_HOST"]).unwrap_or_else(|| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    env_first(&["SWITCHBOARD_PORT", "PORT"])
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_broker_url() -> String {
    env_first(&["SWITCHBOARD_BROKER_URL", "CENTRIFUGO_URL"])
        .unwrap_or_else(|| "http://localhost:8000".to_string())
}

fn default_api_key() -> String {
    env_first(&["SWITCHBOARD_BROKER_API_KEY", "CENTRIFUGO_API_KEY"])
        .unwrap_or_else(|| "api_key".to_string())
}

fn default_publish_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_token_secret() -> String {
    env_first(&["SWITCHBOARD_TOKEN_SECRET", "CENTRIFUGO_TOKEN_HMAC_SECRET_KEY"])
        .unwrap_or_else(|| "token_hmac_secret_key".to_string())
}

fn default_token_ttl() -> u64 {
    24 * 60 * 60 // 24 hours
}

fn default_topics() -> Vec<String> {
    switchboard_core::topic::DEFAULT_TOPICS
        .iter()
        .map(|t| (*t).to_string())
        .collect()
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            broker: BrokerConfig::default(),
            token: TokenConfig::default(),
            topics: default_topics(),
            cors: CorsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            api_key: default_api_key(),
            publish_timeout_ms: default_publish_timeout(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            hmac_secret: default_token_secret(),
            ttl_secs: default_token_ttl(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("publish_timeout_ms", &self.publish_timeout_ms)
            .finish()
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("hmac_secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl Config {
    /// Load configuration from file, environment, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the resulting configuration is invalid.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        for path in &CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            let candidate = Path::new(expanded.as_ref());
            if candidate.exists() {
                info!("Loading configuration from {}", candidate.display());
                builder = builder.add_source(
                    config::File::from(candidate).format(config::FileFormat::Toml),
                );
                break;
            }
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("SWITCHBOARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.broker.url.trim().is_empty() {
            bail!("broker.url must not be empty");
        }
        if self.token.hmac_secret.is_empty() {
            bail!("token.hmac_secret must not be empty");
        }
        if self.broker.publish_timeout_ms == 0 {
            bail!("broker.publish_timeout_ms must be greater than zero");
        }
        self.catalog().context("Invalid topic catalog")?;
        Ok(())
    }

    /// Build the topic catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured topics do not form a valid catalog.
    pub fn catalog(&self) -> Result<TopicCatalog> {
        Ok(TopicCatalog::new(self.topics.clone())?)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.broker.publish_timeout_ms, 10_000);
        assert_eq!(config.token.ttl_secs, 86_400);
        assert_eq!(
            config.topics,
            vec!["all", "general", "tech", "random", "announcements"]
        );
        assert_eq!(config.cors.allowed_origins.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_first_prefers_earlier_names() {
        let primary = "SWITCHBOARD_TEST_ENV_FIRST_PRIMARY";
        let legacy = "SWITCHBOARD_TEST_ENV_FIRST_LEGACY";
        let unset = "SWITCHBOARD_TEST_ENV_FIRST_UNSET";

        std::env::set_var(legacy, "http://legacy:8000");
        assert_eq!(
            env_first(&[primary, legacy]).as_deref(),
            Some("http://legacy:8000")
        );

        std::env::set_var(primary, "http://primary:8000");
        assert_eq!(
            env_first(&[primary, legacy]).as_deref(),
            Some("http://primary:8000")
        );

        assert_eq!(env_first(&[unset]), None);
    }

    #[test]
    fn test_default_host_binds_all_interfaces() {
        if std::env::var("SWITCHBOARD_HOST").is_err() {
            assert_eq!(Config::default().host, "0.0.0.0");
        }
        assert!(Config::default().bind_addr().is_ok());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 9000,
            ..Config::default()
        };
        assert_eq!(config.bind_addr().unwrap().port(), 9000);

        let bad = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000
            topics = ["all", "rust"]

            [broker]
            url = "http://broker:8000"
            publish_timeout_ms = 2500

            [token]
            hmac_secret = "s3cret"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.broker.url, "http://broker:8000");
        assert_eq!(config.broker.publish_timeout_ms, 2500);
        assert_eq!(config.token.hmac_secret, "s3cret");
        assert_eq!(config.token.ttl_secs, 86_400);
        assert_eq!(config.catalog().unwrap().len(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.broker.url = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.token.hmac_secret = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.broker.publish_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.topics = vec!["general".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default();
        config.broker.api_key = "visible-key".to_string();
        config.token.hmac_secret = "visible-secret".to_string();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("visible-key"));
        assert!(!rendered.contains("visible-secret"));
    }
}
