//! Wire types for the OIDC endpoints.

use serde::{Deserialize, Serialize};

/// Query parameters of the authorization endpoint.
///
/// Validated against the client registry before anything is written to the
/// cache; stored verbatim inside the pending authentication context so the
/// assertion consumer can finish the flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    /// Only `code` is supported.
    pub response_type: String,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    pub state: String,
    pub code_challenge: String,
    #[serde(default = "default_code_challenge_method")]
    pub code_challenge_method: String,
    /// Narrows the configured login methods to one, skipping the chooser.
    #[serde(default)]
    pub login_hint: Option<String>,
    /// Delegated authorization with scoping attributes. Only valid against
    /// providers that allow scoping.
    #[serde(default)]
    pub authorization_by_proxy: bool,
}

fn default_scope() -> String {
    "openid".to_string()
}

fn default_code_challenge_method() -> String {
    "S256".to_string()
}

/// Form body of the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub code_verifier: String,
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub id_token: String,
}

/// Discovery document (RFC 8414 subset). Capability lists are fixed: this
/// provider only does the PKCE authorization-code flow with pairwise
/// subjects and public clients.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub scopes_supported: Vec<&'static str>,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub subject_types_supported: Vec<&'static str>,
    pub id_token_signing_alg_values_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
}

impl ProviderMetadata {
    pub fn for_issuer(issuer: &str) -> Self {
        let base = issuer.trim_end_matches('/');
        Self {
            issuer: base.to_string(),
            authorization_endpoint: format!("{}/authorize", base),
            token_endpoint: format!("{}/token", base),
            userinfo_endpoint: format!("{}/userinfo", base),
            jwks_uri: format!("{}/jwks", base),
            scopes_supported: vec!["openid"],
            response_types_supported: vec!["code"],
            grant_types_supported: vec!["authorization_code"],
            subject_types_supported: vec!["pairwise"],
            id_token_signing_alg_values_supported: vec!["RS256"],
            token_endpoint_auth_methods_supported: vec!["none"],
            code_challenge_methods_supported: vec!["S256"],
        }
    }
}
