//! RS256 token issuance and verification.
//!
//! Access and ID tokens are both JWTs signed with the broker's RSA key, so
//! introspection at the userinfo endpoint is a local signature and expiry
//! check rather than a network call. Subjects are pairwise: a salted hash
//! of the upstream identity, so no two relying parties can correlate users
//! through the `sub` claim and the upstream identifier is never exposed.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::OidcError;
use crate::config::OidcConfig;
use crate::store::AuthorizationGrant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub at_hash: String,
}

/// The pair minted by one code exchange.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub id_token: String,
    pub at_hash: String,
}

pub struct TokenSigner {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    kid: String,
    jwks: serde_json::Value,
    subject_salt: String,
    access_token_lifetime_secs: u64,
    id_token_lifetime_secs: u64,
}

impl TokenSigner {
    pub fn from_config(config: &OidcConfig) -> Result<Self, OidcError> {
        let private_pem = std::fs::read(&config.rsa_private_key).map_err(|e| {
            OidcError::Internal(format!("failed to read {}: {}", config.rsa_private_key, e))
        })?;
        let public_pem = std::fs::read(&config.rsa_public_key).map_err(|e| {
            OidcError::Internal(format!("failed to read {}: {}", config.rsa_public_key, e))
        })?;
        Self::from_pems(config, &private_pem, &public_pem)
    }

    pub fn from_pems(
        config: &OidcConfig,
        private_pem: &[u8],
        public_pem: &[u8],
    ) -> Result<Self, OidcError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| OidcError::Internal(format!("invalid rsa private key: {}", e)))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| OidcError::Internal(format!("invalid rsa public key: {}", e)))?;
        let (kid, jwks) = build_jwks(public_pem)?;

        Ok(Self {
            issuer: config.issuer.trim_end_matches('/').to_string(),
            encoding_key,
            decoding_key,
            kid,
            jwks,
            subject_salt: config.subject_id_hash_salt.clone(),
            access_token_lifetime_secs: config.access_token_lifetime_secs,
            id_token_lifetime_secs: config.id_token_lifetime_secs,
        })
    }

    pub fn access_token_lifetime_secs(&self) -> u64 {
        self.access_token_lifetime_secs
    }

    /// Precomputed JWKS document for the `/jwks` endpoint.
    pub fn jwks(&self) -> &serde_json::Value {
        &self.jwks
    }

    /// Pairwise subject identifier: salted SHA-256 of the upstream NameID.
    pub fn pairwise_subject(&self, name_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.subject_salt.as_bytes());
        hasher.update(name_id.as_bytes());
        hex_encode(&hasher.finalize())
    }

    /// Mint the access and ID token for one grant.
    pub fn issue_tokens(
        &self,
        grant: &AuthorizationGrant,
        subject: &str,
    ) -> Result<IssuedTokens, OidcError> {
        let now = Utc::now().timestamp();
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());

        let access_claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: grant.client_id.clone(),
            exp: now + self.access_token_lifetime_secs as i64,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };
        let access_token = encode(&header, &access_claims, &self.encoding_key)
            .map_err(|e| OidcError::Internal(format!("failed to sign access token: {}", e)))?;

        let at_hash = compute_at_hash(&access_token);
        let id_claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: grant.client_id.clone(),
            exp: now + self.id_token_lifetime_secs as i64,
            iat: now,
            nonce: grant.nonce.clone(),
            at_hash: at_hash.clone(),
        };
        let id_token = encode(&header, &id_claims, &self.encoding_key)
            .map_err(|e| OidcError::Internal(format!("failed to sign id token: {}", e)))?;

        Ok(IssuedTokens {
            access_token,
            id_token,
            at_hash,
        })
    }

    /// Local introspection: signature, expiry, issuer. Any failure is a
    /// generic refusal.
    pub fn introspect_access_token(&self, token: &str) -> Result<AccessTokenClaims, OidcError> {
        self.verify::<AccessTokenClaims>(token)
    }

    /// Verify a bearer ID token (legacy mode) and return its claims.
    pub fn verify_id_token(&self, token: &str) -> Result<IdTokenClaims, OidcError> {
        self.verify::<IdTokenClaims>(token)
    }

    fn verify<C: serde::de::DeserializeOwned>(&self, token: &str) -> Result<C, OidcError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        // aud is the relying party's client_id, checked against the stored
        // context instead.
        validation.validate_aud = false;

        decode::<C>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token verification failed");
                OidcError::Unauthorized { error_page: None }
            })
    }
}

/// OIDC Core at_hash: base64url of the left half of SHA-256 over the
/// access token octets.
pub fn compute_at_hash(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..16])
}

/// PKCE S256 check (RFC 7636). The plain method is not accepted.
pub fn verify_pkce_s256(code_verifier: &str, code_challenge: &str) -> bool {
    let derived = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));
    // Both sides are fixed-length digests of attacker-known data, so a
    // plain comparison is fine here.
    derived == code_challenge
}

fn build_jwks(public_pem: &[u8]) -> Result<(String, serde_json::Value), OidcError> {
    let rsa = openssl::rsa::Rsa::public_key_from_pem(public_pem)
        .map_err(|e| OidcError::Internal(format!("invalid rsa public key pem: {}", e)))?;
    let n = rsa.n().to_vec();
    let e = rsa.e().to_vec();
    let kid = hex_encode(&Sha256::digest(&n)[..8]);

    let jwks = serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": URL_SAFE_NO_PAD.encode(&n),
            "e": URL_SAFE_NO_PAD.encode(&e),
        }]
    });
    Ok((kid, jwks))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppMode;

    fn test_keypair() -> (Vec<u8>, Vec<u8>) {
        let rsa = openssl::rsa::Rsa::generate(2048).unwrap();
        let private = rsa.private_key_to_pem().unwrap();
        let public = rsa.public_key_to_pem().unwrap();
        (private, public)
    }

    fn test_config() -> OidcConfig {
        OidcConfig {
            issuer: "https://broker.example.nl".to_string(),
            rsa_private_key: String::new(),
            rsa_public_key: String::new(),
            subject_id_hash_salt: "0123456789abcdef".to_string(),
            app_mode: AppMode::Current,
            access_token_lifetime_secs: 3600,
            id_token_lifetime_secs: 3600,
            authentication_context_ttl_secs: 900,
            authorization_code_ttl_secs: 60,
            userinfo_ttl_secs: None,
            login_methods: vec!["digid".to_string()],
            clients_file: String::new(),
        }
    }

    fn signer() -> TokenSigner {
        let (private, public) = test_keypair();
        TokenSigner::from_pems(&test_config(), &private, &public).unwrap()
    }

    fn grant() -> AuthorizationGrant {
        AuthorizationGrant {
            client_id: "test_client".to_string(),
            redirect_uri: "http://localhost:3000/login".to_string(),
            nonce: Some("n-1".to_string()),
            scope: "openid".to_string(),
            code_challenge: "abc".to_string(),
            code_challenge_method: "S256".to_string(),
        }
    }

    #[test]
    fn issued_access_token_introspects() {
        let signer = signer();
        let tokens = signer.issue_tokens(&grant(), "subject-1").unwrap();

        let claims = signer.introspect_access_token(&tokens.access_token).unwrap();
        assert_eq!(claims.sub, "subject-1");
        assert_eq!(claims.aud, "test_client");
        assert_eq!(claims.iss, "https://broker.example.nl");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn id_token_carries_nonce_and_matching_at_hash() {
        let signer = signer();
        let tokens = signer.issue_tokens(&grant(), "subject-1").unwrap();

        let claims = signer.verify_id_token(&tokens.id_token).unwrap();
        assert_eq!(claims.nonce.as_deref(), Some("n-1"));
        // The hash in the ID token is derivable from the access token.
        assert_eq!(claims.at_hash, compute_at_hash(&tokens.access_token));
        assert_eq!(claims.at_hash, tokens.at_hash);
    }

    #[test]
    fn tokens_from_another_key_are_rejected() {
        let signer_a = signer();
        let signer_b = signer();
        let tokens = signer_a.issue_tokens(&grant(), "subject-1").unwrap();

        assert!(signer_b.introspect_access_token(&tokens.access_token).is_err());
        assert!(signer_b.verify_id_token(&tokens.id_token).is_err());
        assert!(signer_a.introspect_access_token("not-a-jwt").is_err());
    }

    #[test]
    fn at_hash_is_stable_and_url_safe() {
        let a = compute_at_hash("some-access-token");
        let b = compute_at_hash("some-access-token");
        assert_eq!(a, b);
        // 16 bytes base64url without padding
        assert_eq!(a.len(), 22);
        assert_ne!(a, compute_at_hash("other-access-token"));
    }

    #[test]
    fn pkce_s256_verification() {
        // RFC 7636 appendix B test vector.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(verify_pkce_s256(verifier, challenge));
        assert!(!verify_pkce_s256("wrong-verifier", challenge));
    }

    #[test]
    fn pairwise_subject_hides_the_upstream_identifier() {
        let signer = signer();
        let subject = signer.pairwise_subject("999991772");
        assert_eq!(subject, signer.pairwise_subject("999991772"));
        assert_ne!(subject, signer.pairwise_subject("999991771"));
        assert!(!subject.contains("999991772"));

        // A different salt yields a different subject space.
        let (private, public) = test_keypair();
        let mut config = test_config();
        config.subject_id_hash_salt = "another-salt".to_string();
        let other = TokenSigner::from_pems(&config, &private, &public).unwrap();
        assert_ne!(subject, other.pairwise_subject("999991772"));
    }

    #[test]
    fn jwks_exposes_one_rs256_key() {
        let signer = signer();
        let jwks = signer.jwks();
        let keys = jwks["keys"].as_array().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0]["kty"], "RSA");
        assert_eq!(keys[0]["alg"], "RS256");
        assert!(!keys[0]["n"].as_str().unwrap().is_empty());
        assert!(!keys[0]["kid"].as_str().unwrap().is_empty());
    }
}
