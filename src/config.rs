//! Configuration management for the hookline delivery service.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use hookline_core::RegistryConfig;
use hookline_delivery::{ClientConfig, RetryPolicy, ServiceConfig};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "hookline.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed `HOOKLINE_` (highest priority)
/// 2. Configuration file (`hookline.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// The service works out-of-the-box with production-ready defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Registry
    /// Require HTTPS endpoint URLs.
    ///
    /// Environment variable: `HOOKLINE_REQUIRE_HTTPS`
    #[serde(default = "default_require_https")]
    pub require_https: bool,

    // Retry
    /// Maximum delivery attempts per (event, endpoint) pair.
    ///
    /// Environment variable: `HOOKLINE_MAX_RETRY_ATTEMPTS`
    #[serde(default = "default_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base delay for exponential backoff in milliseconds.
    ///
    /// Environment variable: `HOOKLINE_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    ///
    /// Environment variable: `HOOKLINE_RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    ///
    /// Environment variable: `HOOKLINE_RETRY_JITTER_FACTOR`
    #[serde(default = "default_jitter_factor")]
    pub retry_jitter_factor: f64,

    // Client
    /// User agent presented to webhook endpoints.
    ///
    /// Environment variable: `HOOKLINE_USER_AGENT`
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum redirects followed per delivery.
    ///
    /// Environment variable: `HOOKLINE_MAX_REDIRECTS`
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    /// Whether to verify endpoint TLS certificates.
    ///
    /// Environment variable: `HOOKLINE_VERIFY_TLS`
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

impl Config {
    /// Loads configuration from defaults, config file, and environment
    /// variable overrides.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("HOOKLINE_"));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the delivery crate's configuration types.
    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig {
            registry: RegistryConfig { require_https: self.require_https },
            retry: RetryPolicy {
                max_attempts: self.max_retry_attempts,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
                jitter_factor: self.retry_jitter_factor,
            },
            client: ClientConfig {
                user_agent: self.user_agent.clone(),
                max_redirects: self.max_redirects,
                verify_tls: self.verify_tls,
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_retry_attempts == 0 {
            anyhow::bail!("max_retry_attempts must be greater than 0");
        }

        if self.retry_base_delay_ms == 0 {
            anyhow::bail!("retry_base_delay_ms must be greater than 0");
        }

        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            anyhow::bail!("retry_max_delay_ms cannot be less than retry_base_delay_ms");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 1.0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            require_https: default_require_https(),
            max_retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_jitter_factor: default_jitter_factor(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            verify_tls: default_verify_tls(),
        }
    }
}

fn default_require_https() -> bool {
    true
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_factor() -> f64 {
    0.2
}

fn default_user_agent() -> String {
    "Hookline-Delivery/1.0".to_string()
}

fn default_max_redirects() -> u32 {
    3
}

fn default_verify_tls() -> bool {
    true
}
