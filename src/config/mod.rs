//! Configuration for the broker.
//!
//! The broker is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8006
//!
//! [cache]
//! type = "redis"
//! url = "redis://:${REDIS_PASSWORD}@localhost:6379"
//! ```

mod cache;
mod clients;
mod oidc;
mod ratelimit;
mod saml;
mod server;

use std::path::Path;

pub use cache::*;
pub use clients::*;
pub use oidc::*;
pub use ratelimit::*;
pub use saml::*;
use serde::{Deserialize, Serialize};
pub use server::*;

/// Root configuration for the broker.
///
/// All sections except `oidc` and `saml` are optional with sensible
/// defaults, allowing a minimal configuration for local development.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Cache backend for contexts, counters, and runtime settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// OIDC provider configuration (issuer, keys, TTLs).
    pub oidc: OidcConfig,

    /// Per-origin and per-provider rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Upstream SAML identity providers.
    pub saml: SamlConfig,
}

impl BrokerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: BrokerConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.cache.validate()?;
        self.oidc.validate()?;
        self.rate_limit.validate()?;
        self.saml.validate(self.server.is_production())?;

        // Every configured login method must map to a known provider.
        for method in &self.oidc.login_methods {
            if !self.saml.identity_providers.contains_key(method) {
                return Err(ConfigError::Validation(format!(
                    "oidc.login_methods entry '{}' has no matching [saml.identity_providers.{}] section",
                    method, method
                )));
            }
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand `${VAR_NAME}` references in the config text.
///
/// Variables inside TOML comments are left alone so commented-out examples
/// don't require the variable to be set.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| {
        ConfigError::Validation(format!("internal: env var pattern failed to compile: {}", e))
    })?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };
            let match_start = whole.start();

            if let Some(pos) = comment_pos
                && match_start >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..match_start]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
