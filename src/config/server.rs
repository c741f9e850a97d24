use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment name. A name starting with "prod" disables
    /// the mock identity provider at validation time.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Trust the X-Forwarded-For header for client-IP extraction. Enable
    /// only when the broker is exclusively reachable through a reverse
    /// proxy that sets the header, otherwise clients can dodge the
    /// per-IP rate limit by spoofing it.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            trust_proxy_headers: false,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.is_empty() {
            return Err(ConfigError::Validation(
                "server.environment must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.starts_with("prod")
    }
}

fn default_host() -> IpAddr {
    [127, 0, 0, 1].into()
}

fn default_port() -> u16 {
    8006
}

fn default_environment() -> String {
    "development".to_string()
}
