//! The authorize → token → userinfo orchestrator.
//!
//! One flow runs as a state machine spread over three HTTP exchanges,
//! correlated through the cache: authorize parks the request and sends the
//! user upstream; the assertion consumer claims it back, resolves the
//! artifact, and mints the authorization code; the token endpoint spends
//! the code and binds the userinfo payload to the issued tokens.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use super::error::OidcError;
use super::token::{TokenSigner, verify_pkce_s256};
use super::types::{AuthorizeRequest, ProviderMetadata, TokenRequest, TokenResponse};
use crate::config::{AppMode, AuthnBinding, ClientRegistry, OidcConfig};
use crate::ratelimit::RateLimiter;
use crate::saml::{AuthnRequestEnvelope, SamlError, SamlIdentityProvider};
use crate::store::{AcsContext, AuthenticationState, AuthorizationGrant, ContextStore};

/// What the authorize endpoint should send back to the browser.
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// 303 to the given URL (Redirect binding, or the local mock IdP).
    Redirect(String),
    /// Auto-submitting form POST to the IdP (POST binding).
    PostForm {
        sso_url: String,
        saml_request: String,
        relay_state: String,
    },
    /// More than one login method applies; the user has to pick.
    LoginChooser {
        client_name: String,
        methods: Vec<String>,
        request: AuthorizeRequest,
    },
}

pub struct OidcProvider {
    config: OidcConfig,
    clients: ClientRegistry,
    rate_limiter: RateLimiter,
    store: ContextStore,
    signer: TokenSigner,
    identity_providers: HashMap<String, Arc<SamlIdentityProvider>>,
}

impl OidcProvider {
    pub fn new(
        config: OidcConfig,
        clients: ClientRegistry,
        rate_limiter: RateLimiter,
        store: ContextStore,
        signer: TokenSigner,
        identity_providers: HashMap<String, Arc<SamlIdentityProvider>>,
    ) -> Self {
        Self {
            config,
            clients,
            rate_limiter,
            store,
            signer,
            identity_providers,
        }
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn discovery(&self) -> ProviderMetadata {
        ProviderMetadata::for_issuer(&self.config.issuer)
    }

    pub fn jwks(&self) -> serde_json::Value {
        self.signer.jwks().clone()
    }

    /// Start a login. Client and redirect_uri are checked before anything
    /// is counted or written; all later failures are safe to redirect.
    pub async fn authorize(
        &self,
        origin: IpAddr,
        request: AuthorizeRequest,
    ) -> Result<AuthorizeOutcome, OidcError> {
        let client = self
            .clients
            .get(&request.client_id)
            .ok_or(OidcError::InvalidClient)?;
        if !self
            .clients
            .allows_redirect(&request.client_id, &request.redirect_uri)
        {
            return Err(OidcError::InvalidRedirectUri);
        }

        if request.response_type != "code" {
            return Err(self.redirect_error(
                &request,
                "unsupported_response_type",
                "only the code response type is supported",
            ));
        }
        if !request.scope.split_whitespace().any(|s| s == "openid") {
            return Err(self.redirect_error(
                &request,
                "invalid_scope",
                "the openid scope is required",
            ));
        }
        if request.code_challenge.is_empty() {
            return Err(self.redirect_error(
                &request,
                "invalid_request",
                "code_challenge is required",
            ));
        }

        let methods = self.applicable_login_methods(&request)?;
        if methods.len() > 1 {
            return Ok(AuthorizeOutcome::LoginChooser {
                client_name: client.name.clone(),
                methods,
                request,
            });
        }
        let method = &methods[0];

        // Admission control runs for every login, the mock one included.
        let selected_idp = self
            .rate_limiter
            .select_provider_and_validate(origin)
            .await?;

        let provider = self.select_identity_provider(method, &selected_idp)?;
        if request.authorization_by_proxy && !provider.allow_scoping() {
            tracing::warn!(
                client_id = %request.client_id,
                idp = %provider.name(),
                "proxy authorization requested against a provider without scoping"
            );
            return Err(OidcError::Unauthorized { error_page: None });
        }

        let authentication_state = AuthenticationState {
            idp_name: provider.name().to_string(),
            authorization_by_proxy: request.authorization_by_proxy,
        };
        let authorization_by_proxy = request.authorization_by_proxy;
        let relay_state = self
            .store
            .create_authentication_request_state(request, authentication_state)
            .await?;

        let envelope = provider.create_authn_request(
            &relay_state,
            authorization_by_proxy,
            provider.default_cluster(),
        )?;
        tracing::info!(idp = %provider.name(), "authentication request issued");

        Ok(match envelope {
            AuthnRequestEnvelope::Redirect { url } => AuthorizeOutcome::Redirect(url),
            AuthnRequestEnvelope::Mock { url } => AuthorizeOutcome::Redirect(url),
            AuthnRequestEnvelope::Post {
                sso_url,
                saml_request,
                relay_state,
            } => AuthorizeOutcome::PostForm {
                sso_url,
                saml_request,
                relay_state,
            },
        })
    }

    /// Finish a login after the IdP posted the user back with an artifact.
    /// Returns the redirect URL carrying the authorization code.
    ///
    /// `client_id_hint` is an explicit query parameter on the return leg;
    /// the relay-state token itself is never decoded. The hint only decides
    /// which error page to show when the context is already gone.
    pub async fn resume_from_assertion(
        &self,
        relay_state: &str,
        artifact: &str,
        client_id_hint: Option<&str>,
    ) -> Result<String, OidcError> {
        let Some(context) = self
            .store
            .take_authentication_request_state(relay_state)
            .await?
        else {
            tracing::warn!("assertion returned for an unknown or expired relay state");
            return Err(OidcError::Unauthorized {
                error_page: self.error_page_for(client_id_hint),
            });
        };

        let request = &context.authorize_request;
        let idp_name = &context.authentication_state.idp_name;
        let provider = self.identity_providers.get(idp_name).ok_or_else(|| {
            OidcError::Internal(format!("identity provider '{}' disappeared", idp_name))
        })?;

        let identity = provider.resolve_artifact(artifact).await.map_err(|e| {
            // The client is known here, so its error page applies.
            match e {
                SamlError::Unauthorized | SamlError::ScopingAttributesNotAllowed => {
                    OidcError::Unauthorized {
                        error_page: self.error_page_for(Some(&request.client_id)),
                    }
                }
                other => OidcError::from(other),
            }
        })?;

        let subject = self.signer.pairwise_subject(&identity.name_id);
        let mut userinfo = serde_json::Map::new();
        userinfo.insert("sub".to_string(), serde_json::Value::String(subject));
        if let serde_json::Value::Object(attributes) = identity.attributes {
            for (name, value) in attributes {
                userinfo.entry(name).or_insert(value);
            }
        }

        let code = self.store.generate_token();
        let acs_context = AcsContext {
            grant: AuthorizationGrant::from_request(request),
            authentication_method: idp_name.clone(),
            authentication_state: context.authentication_state.clone(),
            userinfo: serde_json::Value::Object(userinfo),
            created_at: chrono::Utc::now(),
        };
        self.store.cache_acs_context(&code, &acs_context).await?;

        tracing::info!(client_id = %request.client_id, idp = %idp_name, "authorization code issued");

        Ok(format!(
            "{}?{}",
            request.redirect_uri,
            serde_urlencoded::to_string([("code", code.as_str()), ("state", request.state.as_str())])
                .map_err(|e| OidcError::Internal(e.to_string()))?
        ))
    }

    /// Spend an authorization code for tokens.
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, OidcError> {
        if request.grant_type != "authorization_code" {
            return Err(OidcError::InvalidGrant(
                "only the authorization_code grant is supported",
            ));
        }

        // Atomic take: a second exchange of the same code lands here.
        let Some(context) = self.store.take_acs_context(&request.code).await? else {
            tracing::warn!(client_id = %request.client_id, "token request with unknown or spent code");
            return Err(OidcError::ExpiredCode);
        };
        let grant = &context.grant;

        if grant.client_id != request.client_id {
            return Err(OidcError::InvalidGrant("client_id does not match"));
        }
        if grant.redirect_uri != request.redirect_uri {
            return Err(OidcError::InvalidGrant("redirect_uri does not match"));
        }
        if grant.code_challenge_method != "S256" {
            return Err(OidcError::InvalidGrant("unsupported code_challenge_method"));
        }
        if !verify_pkce_s256(&request.code_verifier, &grant.code_challenge) {
            return Err(OidcError::InvalidGrant("code verifier does not match"));
        }

        let subject = context
            .userinfo
            .get("sub")
            .and_then(|v| v.as_str())
            .ok_or_else(|| OidcError::Internal("acs context without subject".to_string()))?;
        let tokens = self.signer.issue_tokens(grant, subject)?;

        // Legacy clients look userinfo up by the ID token's at_hash rather
        // than by the access token.
        let userinfo_key = match self.config.app_mode {
            AppMode::Legacy => tokens.at_hash.as_str(),
            AppMode::Current => tokens.access_token.as_str(),
        };
        self.store
            .cache_userinfo_context(userinfo_key, &tokens.access_token, context.userinfo.clone())
            .await?;

        tracing::info!(client_id = %request.client_id, "tokens issued");

        Ok(TokenResponse {
            access_token: tokens.access_token,
            token_type: "Bearer",
            expires_in: self.signer.access_token_lifetime_secs(),
            id_token: tokens.id_token,
        })
    }

    /// Serve the claims bound to a bearer token. Every failure collapses to
    /// the same generic refusal.
    pub async fn userinfo(&self, bearer: &str) -> Result<serde_json::Value, OidcError> {
        let unauthorized = || OidcError::Unauthorized { error_page: None };

        match self.config.app_mode {
            AppMode::Current => {
                self.signer.introspect_access_token(bearer)?;
                let context = self
                    .store
                    .get_userinfo_context(bearer)
                    .await?
                    .ok_or_else(unauthorized)?;
                if context.access_token != bearer {
                    return Err(unauthorized());
                }
                Ok(context.userinfo)
            }
            AppMode::Legacy => {
                // The bearer is the ID token; the at_hash claim inside it
                // keys the stored payload.
                let claims = self.signer.verify_id_token(bearer)?;
                let context = self
                    .store
                    .get_userinfo_context(&claims.at_hash)
                    .await?
                    .ok_or_else(unauthorized)?;
                // The bound access token must itself still be live.
                self.signer.introspect_access_token(&context.access_token)?;
                Ok(context.userinfo)
            }
        }
    }

    /// Login methods that apply to this request. A login_hint narrows the
    /// configured list; a hint matching nothing is a client error.
    fn applicable_login_methods(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<Vec<String>, OidcError> {
        let methods: Vec<String> = match &request.login_hint {
            Some(hint) => self
                .config
                .login_methods
                .iter()
                .filter(|m| *m == hint)
                .cloned()
                .collect(),
            None => self.config.login_methods.clone(),
        };
        if methods.is_empty() {
            return Err(self.redirect_error(
                request,
                "invalid_request",
                "login_hint does not match a configured login method",
            ));
        }
        Ok(methods)
    }

    /// The chosen login method decides between mock and real; within real
    /// providers the rate limiter's pick wins, so operators can steer load
    /// between primary and overflow at runtime.
    fn select_identity_provider(
        &self,
        method: &str,
        selected_idp: &str,
    ) -> Result<&Arc<SamlIdentityProvider>, OidcError> {
        let method_provider = self.identity_providers.get(method).ok_or_else(|| {
            OidcError::Internal(format!("login method '{}' has no identity provider", method))
        })?;
        if method_provider.binding() == AuthnBinding::Mock {
            return Ok(method_provider);
        }
        self.identity_providers.get(selected_idp).ok_or_else(|| {
            OidcError::Internal(format!(
                "rate limiter selected unknown identity provider '{}'",
                selected_idp
            ))
        })
    }

    fn error_page_for(&self, client_id: Option<&str>) -> Option<String> {
        client_id
            .and_then(|id| self.clients.error_page(id))
            .map(str::to_string)
    }

    /// Redirect-class error; only reachable after redirect_uri validation.
    fn redirect_error(
        &self,
        request: &AuthorizeRequest,
        error: &'static str,
        description: &str,
    ) -> OidcError {
        OidcError::Redirect {
            error,
            description: description.to_string(),
            redirect_uri: request.redirect_uri.clone(),
            state: request.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use sha2::{Digest, Sha256};

    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::config::{AppMode, ClientEntry, RateLimitConfig, SamlProviderConfig};
    use crate::store::ContextTtls;

    const NO_EXPIRY: Duration = Duration::ZERO;

    fn test_oidc_config(app_mode: AppMode) -> OidcConfig {
        OidcConfig {
            issuer: "https://broker.example.nl".to_string(),
            rsa_private_key: String::new(),
            rsa_public_key: String::new(),
            subject_id_hash_salt: "0123456789abcdef".to_string(),
            app_mode,
            access_token_lifetime_secs: 3600,
            id_token_lifetime_secs: 3600,
            authentication_context_ttl_secs: 900,
            authorization_code_ttl_secs: 60,
            userinfo_ttl_secs: None,
            login_methods: vec!["digid".to_string()],
            clients_file: String::new(),
        }
    }

    fn mock_provider_config() -> SamlProviderConfig {
        SamlProviderConfig {
            binding: AuthnBinding::Mock,
            sp_entity_id: String::new(),
            acs_url: String::new(),
            idp_entity_id: String::new(),
            sso_url: String::new(),
            artifact_resolve_url: String::new(),
            idp_certificate: None,
            sp_private_key: None,
            sp_certificate: None,
            sign_requests: false,
            allow_scoping: false,
            name_id_format: None,
            verify_ssl: true,
            clusters: std::collections::HashMap::new(),
            cluster: None,
        }
    }

    async fn build_provider(app_mode: AppMode) -> (OidcProvider, Arc<dyn Cache>) {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(1024));
        cache
            .set_bytes("config:primary_idp", b"digid", NO_EXPIRY)
            .await
            .unwrap();

        let config = test_oidc_config(app_mode);
        let clients = ClientRegistry::from_entries(vec![(
            "test_client",
            ClientEntry {
                name: "Test portal".to_string(),
                redirect_uris: vec!["http://localhost:3000/login".to_string()],
                error_page: Some("http://localhost:3000/error".to_string()),
            },
        )]);

        let mut limit_config = RateLimitConfig::default();
        limit_config.ipaddress_max_count = 100;
        let rate_limiter = RateLimiter::new(Arc::clone(&cache), limit_config);
        let store = ContextStore::new(Arc::clone(&cache), ContextTtls::from_config(&config));

        let rsa = openssl::rsa::Rsa::generate(2048).unwrap();
        let signer = TokenSigner::from_pems(
            &config,
            &rsa.private_key_to_pem().unwrap(),
            &rsa.public_key_to_pem().unwrap(),
        )
        .unwrap();

        let mut identity_providers = HashMap::new();
        identity_providers.insert(
            "digid".to_string(),
            Arc::new(SamlIdentityProvider::from_config("digid", &mock_provider_config()).unwrap()),
        );

        let provider = OidcProvider::new(
            config,
            clients,
            rate_limiter,
            store,
            signer,
            identity_providers,
        );
        (provider, cache)
    }

    fn pkce_pair() -> (String, String) {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        (verifier, challenge)
    }

    fn authorize_request(code_challenge: &str) -> AuthorizeRequest {
        AuthorizeRequest {
            client_id: "test_client".to_string(),
            redirect_uri: "http://localhost:3000/login".to_string(),
            response_type: "code".to_string(),
            nonce: Some("n-1".to_string()),
            scope: "openid".to_string(),
            state: "s-1".to_string(),
            code_challenge: code_challenge.to_string(),
            code_challenge_method: "S256".to_string(),
            login_hint: None,
            authorization_by_proxy: false,
        }
    }

    fn origin() -> IpAddr {
        IpAddr::from([10, 0, 0, 1])
    }

    fn relay_state_from(outcome: AuthorizeOutcome) -> String {
        match outcome {
            AuthorizeOutcome::Redirect(url) => {
                let (_, query) = url.split_once('?').unwrap();
                let params: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap();
                params
                    .into_iter()
                    .find(|(k, _)| k == "RelayState")
                    .map(|(_, v)| v)
                    .unwrap()
            }
            other => panic!("expected redirect outcome, got {:?}", other),
        }
    }

    fn query_param(url: &str, name: &str) -> String {
        let (_, query) = url.split_once('?').unwrap();
        let params: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap();
        params
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .unwrap_or_else(|| panic!("no {} in {}", name, url))
    }

    #[tokio::test]
    async fn authorize_parks_the_request_under_the_relay_state() {
        let (provider, _cache) = build_provider(AppMode::Current).await;

        let outcome = provider
            .authorize(origin(), authorize_request("abc"))
            .await
            .unwrap();
        let relay_state = relay_state_from(outcome);

        let context = provider
            .store
            .take_authentication_request_state(&relay_state)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.authorize_request.state, "s-1");
        assert_eq!(context.authentication_state.idp_name, "digid");
    }

    #[tokio::test]
    async fn unknown_client_is_rejected_without_a_redirect() {
        let (provider, _cache) = build_provider(AppMode::Current).await;

        let mut request = authorize_request("abc");
        request.client_id = "nobody".to_string();
        let err = provider.authorize(origin(), request).await.unwrap_err();
        assert!(matches!(err, OidcError::InvalidClient));

        let mut request = authorize_request("abc");
        request.redirect_uri = "http://evil.example/login".to_string();
        let err = provider.authorize(origin(), request).await.unwrap_err();
        assert!(matches!(err, OidcError::InvalidRedirectUri));
    }

    #[tokio::test]
    async fn unsupported_response_type_redirects_with_oidc_error() {
        let (provider, _cache) = build_provider(AppMode::Current).await;

        let mut request = authorize_request("abc");
        request.response_type = "token".to_string();
        let err = provider.authorize(origin(), request).await.unwrap_err();
        match err {
            OidcError::Redirect {
                error,
                redirect_uri,
                state,
                ..
            } => {
                assert_eq!(error, "unsupported_response_type");
                assert_eq!(redirect_uri, "http://localhost:3000/login");
                assert_eq!(state, "s-1");
            }
            other => panic!("expected redirect error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn full_flow_issues_code_tokens_and_userinfo() {
        let (provider, _cache) = build_provider(AppMode::Current).await;
        let (verifier, challenge) = pkce_pair();

        let outcome = provider
            .authorize(origin(), authorize_request(&challenge))
            .await
            .unwrap();
        let relay_state = relay_state_from(outcome);

        let artifact = crate::saml::encode_mock_artifact("999991772");
        let redirect = provider
            .resume_from_assertion(&relay_state, &artifact, None)
            .await
            .unwrap();
        assert!(redirect.starts_with("http://localhost:3000/login?"));
        assert_eq!(query_param(&redirect, "state"), "s-1");
        let code = query_param(&redirect, "code");

        let response = provider
            .token(TokenRequest {
                grant_type: "authorization_code".to_string(),
                code: code.clone(),
                redirect_uri: "http://localhost:3000/login".to_string(),
                client_id: "test_client".to_string(),
                code_verifier: verifier,
            })
            .await
            .unwrap();
        assert_eq!(response.token_type, "Bearer");

        let userinfo = provider.userinfo(&response.access_token).await.unwrap();
        let sub = userinfo["sub"].as_str().unwrap();
        // Pairwise subject, not the upstream identifier.
        assert_ne!(sub, "999991772");
        assert!(!sub.is_empty());
    }

    #[tokio::test]
    async fn code_cannot_be_spent_twice() {
        let (provider, _cache) = build_provider(AppMode::Current).await;
        let (verifier, challenge) = pkce_pair();

        let outcome = provider
            .authorize(origin(), authorize_request(&challenge))
            .await
            .unwrap();
        let relay_state = relay_state_from(outcome);
        let artifact = crate::saml::encode_mock_artifact("999991772");
        let redirect = provider
            .resume_from_assertion(&relay_state, &artifact, None)
            .await
            .unwrap();
        let code = query_param(&redirect, "code");

        let request = TokenRequest {
            grant_type: "authorization_code".to_string(),
            code,
            redirect_uri: "http://localhost:3000/login".to_string(),
            client_id: "test_client".to_string(),
            code_verifier: verifier,
        };
        provider.token(request.clone()).await.unwrap();
        let err = provider.token(request).await.unwrap_err();
        assert!(matches!(err, OidcError::ExpiredCode));
    }

    #[tokio::test]
    async fn pkce_mismatch_is_invalid_grant() {
        let (provider, _cache) = build_provider(AppMode::Current).await;
        let (_, challenge) = pkce_pair();

        let outcome = provider
            .authorize(origin(), authorize_request(&challenge))
            .await
            .unwrap();
        let relay_state = relay_state_from(outcome);
        let artifact = crate::saml::encode_mock_artifact("999991772");
        let redirect = provider
            .resume_from_assertion(&relay_state, &artifact, None)
            .await
            .unwrap();
        let code = query_param(&redirect, "code");

        let err = provider
            .token(TokenRequest {
                grant_type: "authorization_code".to_string(),
                code,
                redirect_uri: "http://localhost:3000/login".to_string(),
                client_id: "test_client".to_string(),
                code_verifier: "wrong-verifier-wrong-verifier-wrong-verif".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn expired_relay_state_redirects_only_a_known_client_to_its_error_page() {
        let (provider, _cache) = build_provider(AppMode::Current).await;
        let artifact = crate::saml::encode_mock_artifact("999991772");

        // No hint: bare refusal.
        let err = provider
            .resume_from_assertion("unknown-token", &artifact, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::Unauthorized { error_page: None }));

        // Hint naming a registered client: its error page.
        let err = provider
            .resume_from_assertion("unknown-token", &artifact, Some("test_client"))
            .await
            .unwrap_err();
        match err {
            OidcError::Unauthorized { error_page } => {
                assert_eq!(error_page.as_deref(), Some("http://localhost:3000/error"));
            }
            other => panic!("expected unauthorized, got {:?}", other),
        }

        // Hint naming an unknown client: no page either.
        let err = provider
            .resume_from_assertion("unknown-token", &artifact, Some("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::Unauthorized { error_page: None }));
    }

    #[tokio::test]
    async fn legacy_mode_serves_userinfo_by_id_token_at_hash() {
        let (provider, _cache) = build_provider(AppMode::Legacy).await;
        let (verifier, challenge) = pkce_pair();

        let outcome = provider
            .authorize(origin(), authorize_request(&challenge))
            .await
            .unwrap();
        let relay_state = relay_state_from(outcome);
        let artifact = crate::saml::encode_mock_artifact("999991772");
        let redirect = provider
            .resume_from_assertion(&relay_state, &artifact, None)
            .await
            .unwrap();
        let code = query_param(&redirect, "code");

        let response = provider
            .token(TokenRequest {
                grant_type: "authorization_code".to_string(),
                code,
                redirect_uri: "http://localhost:3000/login".to_string(),
                client_id: "test_client".to_string(),
                code_verifier: verifier,
            })
            .await
            .unwrap();

        // Legacy clients present the ID token at the userinfo endpoint.
        let userinfo = provider.userinfo(&response.id_token).await.unwrap();
        assert!(userinfo["sub"].as_str().is_some());

        // The access token does not work as a lookup key in legacy mode.
        let err = provider.userinfo(&response.access_token).await.unwrap_err();
        assert!(matches!(err, OidcError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn login_hint_mismatch_is_a_redirect_error() {
        let (provider, _cache) = build_provider(AppMode::Current).await;

        let mut request = authorize_request("abc");
        request.login_hint = Some("eherkenning".to_string());
        let err = provider.authorize(origin(), request).await.unwrap_err();
        assert!(matches!(err, OidcError::Redirect { error: "invalid_request", .. }));
    }

    #[tokio::test]
    async fn proxy_authorization_needs_scoping_capability() {
        let (provider, _cache) = build_provider(AppMode::Current).await;

        let mut request = authorize_request("abc");
        request.authorization_by_proxy = true;
        let err = provider.authorize(origin(), request).await.unwrap_err();
        assert!(matches!(err, OidcError::Unauthorized { .. }));
    }
}
