//! Configuration module for api-automate
//!
//! Supports configuration via file and environment variables.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Skip TLS certificate validation (dev/test targets)
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("api-automate/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            accept_invalid_certs: default_accept_invalid_certs(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Automation pacing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Delay before the first step of a run
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
    /// Delay after a step that produced an outcome
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Delay after a step that failed before reaching the executor
    #[serde(default = "default_error_delay_ms")]
    pub error_delay_ms: u64,
}

fn default_start_delay_ms() -> u64 {
    1000
}

fn default_step_delay_ms() -> u64 {
    2000
}

fn default_error_delay_ms() -> u64 {
    1000
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            start_delay_ms: default_start_delay_ms(),
            step_delay_ms: default_step_delay_ms(),
            error_delay_ms: default_error_delay_ms(),
        }
    }
}

impl AutomationConfig {
    /// Pacing with every delay set to zero
    pub fn immediate() -> Self {
        Self {
            start_delay_ms: 0,
            step_delay_ms: 0,
            error_delay_ms: 0,
        }
    }
}

/// Collection handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Host used when neither the request nor the collection names one
    #[serde(default = "default_fallback_base_url")]
    pub fallback_base_url: String,
    /// Header carrying the anti-forgery token
    #[serde(default = "default_csrf_header")]
    pub csrf_header: String,
    /// Marker written into the CSRF header while no token is known
    #[serde(default = "default_csrf_placeholder")]
    pub csrf_placeholder: String,
}

fn default_fallback_base_url() -> String {
    "https://api.example.com".to_string()
}

fn default_csrf_header() -> String {
    "X-XSRF-TOKEN".to_string()
}

fn default_csrf_placeholder() -> String {
    "{{xsrf_token}}".to_string()
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            fallback_base_url: default_fallback_base_url(),
            csrf_header: default_csrf_header(),
            csrf_placeholder: default_csrf_placeholder(),
        }
    }
}

/// Control API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind the server to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Transcript configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Maximum number of entries kept in memory
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> anyhow::Result<Self> {
        // Try to load .env file (ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        if std::path::Path::new("config.toml").exists() {
            config = config.add_source(config::File::with_name("config").required(false));
        }

        // Override with environment variables (e.g. API_AUTOMATE_HTTP__TIMEOUT_MS)
        config = config.add_source(
            config::Environment::with_prefix("API_AUTOMATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).or_else(|_| serde_json::from_str(&contents))?;
        Ok(config)
    }
}

/// Shared handle to the runtime configuration
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<AppConfig>>,
}

impl SharedConfig {
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Get a read-only copy of the configuration
    pub fn get(&self) -> AppConfig {
        self.inner.read().clone()
    }

    pub fn update_http(&self, http: HttpConfig) {
        self.inner.write().http = http;
    }

    pub fn update_automation(&self, automation: AutomationConfig) {
        self.inner.write().automation = automation;
    }

    /// Replace the entire configuration
    pub fn update(&self, config: AppConfig) {
        *self.inner.write() = config;
    }
}
