use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Token-binding mode for the userinfo endpoint.
///
/// `Legacy` is a compatibility mode for older clients that present the ID
/// token at the userinfo endpoint; the userinfo payload is then keyed by the
/// ID token's at_hash claim instead of the access token itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppMode {
    Legacy,
    #[default]
    Current,
}

/// OIDC provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OidcConfig {
    /// Issuer URL, e.g. "https://login.example.nl". Endpoint URLs in the
    /// discovery document are derived from it.
    pub issuer: String,

    /// Path to the RS256 signing key (PEM).
    pub rsa_private_key: String,

    /// Path to the matching public key (PEM), served as JWKS.
    pub rsa_public_key: String,

    /// Salt for the pairwise subject identifier hash.
    pub subject_id_hash_salt: String,

    /// Token-binding mode for userinfo lookups.
    #[serde(default)]
    pub app_mode: AppMode,

    /// Access-token lifetime in seconds.
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime_secs: u64,

    /// ID-token lifetime in seconds.
    #[serde(default = "default_id_token_lifetime")]
    pub id_token_lifetime_secs: u64,

    /// How long a pending authentication context may wait for the SAML
    /// round-trip to complete. Long enough for a user to authenticate at
    /// the IdP, short enough to bound abandoned-session storage.
    #[serde(default = "default_authentication_context_ttl")]
    pub authentication_context_ttl_secs: u64,

    /// Authorization-code validity window.
    #[serde(default = "default_authorization_code_ttl")]
    pub authorization_code_ttl_secs: u64,

    /// Userinfo retention. Defaults to the access-token lifetime.
    #[serde(default)]
    pub userinfo_ttl_secs: Option<u64>,

    /// Login methods offered to end users. More than one applicable method
    /// produces a chooser page on the authorize endpoint.
    #[serde(default = "default_login_methods")]
    pub login_methods: Vec<String>,

    /// Path to the client registry JSON file.
    pub clients_file: String,
}

impl OidcConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() || !self.issuer.starts_with("https://") {
            return Err(ConfigError::Validation(
                "oidc.issuer must be an https:// URL".into(),
            ));
        }
        if self.login_methods.is_empty() {
            return Err(ConfigError::Validation(
                "oidc.login_methods must name at least one method".into(),
            ));
        }
        if self.authorization_code_ttl_secs == 0 || self.authentication_context_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "oidc TTLs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn userinfo_ttl_secs(&self) -> u64 {
        self.userinfo_ttl_secs
            .unwrap_or(self.access_token_lifetime_secs)
    }
}

fn default_access_token_lifetime() -> u64 {
    3600
}

fn default_id_token_lifetime() -> u64 {
    3600
}

fn default_authentication_context_ttl() -> u64 {
    900
}

fn default_authorization_code_ttl() -> u64 {
    60
}

fn default_login_methods() -> Vec<String> {
    vec!["digid".to_string()]
}
