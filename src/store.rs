//! Authentication context lifecycle.
//!
//! Three context kinds move a login through the broker. A pending
//! `AuthenticationContext` is parked under a random relay-state token while
//! the user is at the identity provider. After the assertion comes back, an
//! `AcsContext` carries the resolved identity and the authorization grant
//! under the authorization code. Once tokens are minted, a
//! `UserinfoContext` holds the claims blob under the access token (or the
//! at_hash in legacy mode) for the userinfo endpoint.
//!
//! Pending contexts and ACS contexts are consumed with an atomic take:
//! relay-state tokens and authorization codes are spendable exactly once.
//! Userinfo stays readable until its TTL runs out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CacheExt, CacheKeys, CacheResult};
use crate::config::OidcConfig;
use crate::oidc::AuthorizeRequest;

/// Which provider the login was routed to, and under what rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticationState {
    /// Name of the selected identity provider.
    pub idp_name: String,
    /// Whether this login carries scoping attributes for delegated
    /// authorization.
    pub authorization_by_proxy: bool,
}

/// A login waiting for the SAML round-trip to complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticationContext {
    pub authorize_request: AuthorizeRequest,
    pub authentication_state: AuthenticationState,
    pub created_at: DateTime<Utc>,
}

/// The slice of the original authorize request the token endpoint must
/// re-verify before minting tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub client_id: String,
    pub redirect_uri: String,
    pub nonce: Option<String>,
    pub scope: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl AuthorizationGrant {
    pub fn from_request(request: &AuthorizeRequest) -> Self {
        Self {
            client_id: request.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            nonce: request.nonce.clone(),
            scope: request.scope.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request.code_challenge_method.clone(),
        }
    }
}

/// A completed upstream authentication, parked under the authorization code
/// until the client trades the code for tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcsContext {
    pub grant: AuthorizationGrant,
    /// Login method that produced this identity.
    pub authentication_method: String,
    pub authentication_state: AuthenticationState,
    /// Resolved identity claims from the assertion.
    pub userinfo: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Claims blob served by the userinfo endpoint, bound to one access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserinfoContext {
    pub access_token: String,
    pub userinfo: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// TTLs for the three context kinds, taken from the OIDC configuration.
#[derive(Debug, Clone, Copy)]
pub struct ContextTtls {
    pub authentication_context: Duration,
    pub authorization_code: Duration,
    pub userinfo: Duration,
}

impl ContextTtls {
    pub fn from_config(config: &OidcConfig) -> Self {
        Self {
            authentication_context: Duration::from_secs(config.authentication_context_ttl_secs),
            authorization_code: Duration::from_secs(config.authorization_code_ttl_secs),
            userinfo: Duration::from_secs(config.userinfo_ttl_secs()),
        }
    }
}

/// Cache-backed store for all three context kinds. Every write is a single
/// cache call, so there is no partially-written context to observe.
pub struct ContextStore {
    cache: Arc<dyn Cache>,
    ttls: ContextTtls,
}

impl ContextStore {
    pub fn new(cache: Arc<dyn Cache>, ttls: ContextTtls) -> Self {
        Self { cache, ttls }
    }

    /// Fresh random token, used for authorization codes.
    pub fn generate_token(&self) -> String {
        self.cache.generate_token()
    }

    /// Park a pending login and return the relay-state token that the SAML
    /// round-trip will carry. The token is pure randomness; nothing about
    /// the login can be recovered from it.
    pub async fn create_authentication_request_state(
        &self,
        authorize_request: AuthorizeRequest,
        authentication_state: AuthenticationState,
    ) -> CacheResult<String> {
        let token = self.cache.generate_token();
        let context = AuthenticationContext {
            authorize_request,
            authentication_state,
            created_at: Utc::now(),
        };
        self.cache
            .set_json(
                &CacheKeys::authentication_context(&token),
                &context,
                self.ttls.authentication_context,
            )
            .await?;
        Ok(token)
    }

    /// Claim a pending login. The context is invalidated on first read, so
    /// a replayed relay-state token comes back empty.
    pub async fn take_authentication_request_state(
        &self,
        relay_state: &str,
    ) -> CacheResult<Option<AuthenticationContext>> {
        self.cache
            .take_json(&CacheKeys::authentication_context(relay_state))
            .await
    }

    /// Park a completed authentication under its authorization code.
    pub async fn cache_acs_context(&self, code: &str, context: &AcsContext) -> CacheResult<()> {
        self.cache
            .set_json(
                &CacheKeys::acs_context(code),
                context,
                self.ttls.authorization_code,
            )
            .await
    }

    /// Spend an authorization code. Atomic take closes the replay window:
    /// two concurrent token requests for one code cannot both succeed.
    pub async fn take_acs_context(&self, code: &str) -> CacheResult<Option<AcsContext>> {
        self.cache.take_json(&CacheKeys::acs_context(code)).await
    }

    /// Bind a userinfo payload to an access token (or, in legacy mode, to
    /// the ID token's at_hash, which the caller passes as `key`).
    pub async fn cache_userinfo_context(
        &self,
        key: &str,
        access_token: &str,
        userinfo: serde_json::Value,
    ) -> CacheResult<()> {
        let context = UserinfoContext {
            access_token: access_token.to_string(),
            userinfo,
            created_at: Utc::now(),
        };
        self.cache
            .set_json(
                &CacheKeys::userinfo_context(key),
                &context,
                self.ttls.userinfo,
            )
            .await
    }

    /// Userinfo stays readable until expiry; clients may poll it.
    pub async fn get_userinfo_context(&self, key: &str) -> CacheResult<Option<UserinfoContext>> {
        self.cache
            .get_json(&CacheKeys::userinfo_context(key))
            .await
    }
}
