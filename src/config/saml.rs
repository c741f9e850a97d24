use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Transport binding for the AuthnRequest leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthnBinding {
    /// Auto-submitting HTML form posting the request to the IdP.
    Post,
    /// 302 redirect with a DEFLATE/base64 SAMLRequest query parameter.
    Redirect,
    /// Local mock IdP for development; no upstream exchange.
    Mock,
}

/// SAML configuration: the set of identity providers the broker can send
/// users to. The rate limiter picks one by name at authorize time.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SamlConfig {
    /// Identity providers by name.
    #[serde(default)]
    pub identity_providers: HashMap<String, SamlProviderConfig>,
}

impl SamlConfig {
    pub fn validate(&self, environment_is_production: bool) -> Result<(), ConfigError> {
        if self.identity_providers.is_empty() {
            return Err(ConfigError::Validation(
                "saml.identity_providers must configure at least one provider".into(),
            ));
        }
        for (name, provider) in &self.identity_providers {
            provider.validate(name, environment_is_production)?;
        }
        Ok(())
    }
}

/// One upstream identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamlProviderConfig {
    /// AuthnRequest transport binding.
    pub binding: AuthnBinding,

    /// Our entity ID as known to this IdP.
    #[serde(default)]
    pub sp_entity_id: String,

    /// Assertion Consumer Service URL the IdP redirects back to.
    #[serde(default)]
    pub acs_url: String,

    /// The IdP's entity ID.
    #[serde(default)]
    pub idp_entity_id: String,

    /// The IdP's single-sign-on URL.
    #[serde(default)]
    pub sso_url: String,

    /// The IdP's back-channel artifact-resolution URL.
    #[serde(default)]
    pub artifact_resolve_url: String,

    /// Path to the IdP signing certificate (PEM).
    #[serde(default)]
    pub idp_certificate: Option<String>,

    /// Path to our signing key (PEM), used for signed redirects and as the
    /// TLS client key on the back channel.
    #[serde(default)]
    pub sp_private_key: Option<String>,

    /// Path to our certificate (PEM).
    #[serde(default)]
    pub sp_certificate: Option<String>,

    /// Sign AuthnRequests on the redirect binding.
    #[serde(default = "default_true")]
    pub sign_requests: bool,

    /// Whether scoping attributes (authorization by proxy) are permitted
    /// for this IdP. A proxy-authorization request against a provider with
    /// scoping disabled is rejected outright.
    #[serde(default)]
    pub allow_scoping: bool,

    /// Requested NameID format.
    #[serde(default)]
    pub name_id_format: Option<String>,

    /// Cluster-specific SP entity ID overrides, for IdPs that register one
    /// connection per frontend cluster. Keyed by cluster name.
    #[serde(default)]
    pub clusters: HashMap<String, String>,

    /// Cluster this broker instance belongs to. Must name a key in
    /// `clusters`. Absent means the plain `sp_entity_id` is used.
    #[serde(default)]
    pub cluster: Option<String>,

    /// Verify the IdP's TLS certificate on the back channel.
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

impl SamlProviderConfig {
    fn validate(&self, name: &str, environment_is_production: bool) -> Result<(), ConfigError> {
        if self.binding == AuthnBinding::Mock {
            if environment_is_production {
                return Err(ConfigError::Validation(format!(
                    "identity provider '{}' uses the mock binding, which cannot be enabled in a \
                     production environment",
                    name
                )));
            }
            return Ok(());
        }
        if self.sso_url.is_empty() || self.artifact_resolve_url.is_empty() {
            return Err(ConfigError::Validation(format!(
                "identity provider '{}' needs sso_url and artifact_resolve_url",
                name
            )));
        }
        if self.sp_entity_id.is_empty() || self.acs_url.is_empty() {
            return Err(ConfigError::Validation(format!(
                "identity provider '{}' needs sp_entity_id and acs_url",
                name
            )));
        }
        if self.idp_certificate.is_none() {
            return Err(ConfigError::Validation(format!(
                "identity provider '{}' needs idp_certificate to validate responses",
                name
            )));
        }
        if let Some(cluster) = &self.cluster
            && !self.clusters.contains_key(cluster)
        {
            return Err(ConfigError::Validation(format!(
                "identity provider '{}': cluster '{}' has no entry in clusters",
                name, cluster
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
