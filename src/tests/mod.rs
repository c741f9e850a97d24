//! End-to-end tests driving the full router over in-process HTTP.

use axum::{Router, body::Body};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use http::{Request, StatusCode, header};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use crate::{AppState, build_app, config::BrokerConfig};

const PKCE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

/// Broker wired to the in-memory cache and the mock IdP, with freshly
/// generated signing keys on disk.
async fn test_app(extra_config: &str) -> Router {
    build_app(test_state(extra_config).await)
}

async fn test_state(extra_config: &str) -> AppState {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().expect("tempdir");
    let rsa = openssl::rsa::Rsa::generate(2048).expect("rsa keygen");
    let private_path = dir.path().join("signing.pem");
    let public_path = dir.path().join("signing.pub.pem");
    let clients_path = dir.path().join("clients.json");
    std::fs::write(&private_path, rsa.private_key_to_pem().expect("pem")).expect("write key");
    std::fs::write(&public_path, rsa.public_key_to_pem().expect("pem")).expect("write key");
    std::fs::write(
        &clients_path,
        r#"{
            "test_client": {
                "name": "Test portal",
                "redirect_uris": ["http://localhost:3000/login"],
                "error_page": "http://localhost:3000/error"
            }
        }"#,
    )
    .expect("write clients");

    let config_str = format!(
        r#"
[oidc]
issuer = "https://broker.example.nl"
rsa_private_key = "{}"
rsa_public_key = "{}"
subject_id_hash_salt = "0123456789abcdef"
clients_file = "{}"

[saml.identity_providers.digid]
binding = "mock"

{}
"#,
        private_path.display(),
        public_path.display(),
        clients_path.display(),
        extra_config,
    );
    // Key material must outlive the test; the temp dir handle would delete it.
    std::mem::forget(dir);

    let config = BrokerConfig::from_str(&config_str).expect("parse test config");
    AppState::new(config).await.expect("build AppState")
}

fn pkce_challenge() -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(PKCE_VERIFIER.as_bytes()))
}

fn authorize_uri() -> String {
    format!(
        "/authorize?client_id=test_client&redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Flogin\
         &response_type=code&scope=openid&state=s-1&nonce=n-1&code_challenge={}",
        pkce_challenge()
    )
}

async fn get(app: &Router, uri: &str) -> (StatusCode, http::HeaderMap, String) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, String::from_utf8_lossy(&body).to_string())
}

fn location(headers: &http::HeaderMap) -> String {
    headers
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
        .to_string()
}

fn query_param(url: &str, name: &str) -> String {
    let (_, query) = url.split_once('?').expect("URL with query");
    let params: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap();
    params
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
        .unwrap_or_else(|| panic!("no {} in {}", name, url))
}

/// Walk the whole browser journey: authorize, mock IdP, ACS, token
/// exchange, and finally userinfo.
#[tokio::test]
async fn full_login_round_trip() {
    let app = test_app("").await;

    let (status, headers, _) = get(&app, &authorize_uri()).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let idp_url = location(&headers);
    assert!(idp_url.starts_with("/mock-idp?"), "got {}", idp_url);
    let relay_state = query_param(&idp_url, "RelayState");

    let login_uri = format!(
        "/mock-idp/login?{}",
        serde_urlencoded::to_string([("RelayState", relay_state.as_str()), ("bsn", "999991772")])
            .unwrap()
    );
    let (status, headers, _) = get(&app, &login_uri).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let acs_url = location(&headers);
    assert!(acs_url.starts_with("/acs?"), "got {}", acs_url);

    let (status, headers, _) = get(&app, &acs_url).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let client_url = location(&headers);
    assert!(client_url.starts_with("http://localhost:3000/login?"));
    assert_eq!(query_param(&client_url, "state"), "s-1");
    let code = query_param(&client_url, "code");

    let form = serde_urlencoded::to_string([
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", "http://localhost:3000/login"),
        ("client_id", "test_client"),
        ("code_verifier", PKCE_VERIFIER),
    ])
    .unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let tokens: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(tokens["token_type"], "Bearer");
    let access_token = tokens["access_token"].as_str().unwrap();
    assert!(tokens["id_token"].as_str().is_some());

    let request = Request::builder()
        .method("GET")
        .uri("/userinfo")
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let userinfo: Value = serde_json::from_slice(&body).unwrap();
    let sub = userinfo["sub"].as_str().unwrap();
    assert!(!sub.is_empty());
    assert_ne!(sub, "999991772");
}

#[tokio::test]
async fn discovery_document_names_the_issuer() {
    let app = test_app("").await;

    let (status, _, body) = get(&app, "/.well-known/openid-configuration").await;
    assert_eq!(status, StatusCode::OK);
    let doc: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["issuer"], "https://broker.example.nl");
    assert_eq!(
        doc["authorization_endpoint"],
        "https://broker.example.nl/authorize"
    );
    assert_eq!(doc["code_challenge_methods_supported"][0], "S256");
}

#[tokio::test]
async fn jwks_serves_the_signing_key() {
    let app = test_app("").await;

    let (status, _, body) = get(&app, "/jwks").await;
    assert_eq!(status, StatusCode::OK);
    let jwks: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(jwks["keys"][0]["kty"], "RSA");
    assert_eq!(jwks["keys"][0]["alg"], "RS256");
}

#[tokio::test]
async fn unknown_client_gets_a_plain_400() {
    let app = test_app("").await;

    let uri = authorize_uri().replace("client_id=test_client", "client_id=nobody");
    let (status, headers, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(headers.get(header::LOCATION).is_none());
    let error: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(error["error"], "invalid_client");
}

#[tokio::test]
async fn per_origin_rate_limit_returns_429_with_retry_after() {
    // All in-process requests share the loopback origin, so a limit of 2
    // admits the first two and rejects the third.
    let app = test_app(
        "[rate_limit]\nipaddress_max_count = 2\nipaddress_window_secs = 60\n",
    )
    .await;

    let uri = authorize_uri();
    for _ in 0..2 {
        let (status, _, _) = get(&app, &uri).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
    }
    let (status, headers, _) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "60");
}

#[tokio::test]
async fn provider_outage_flag_turns_logins_away() {
    let state = test_state("[rate_limit]\noutage_key = \"outage:digid\"\n").await;
    let app = build_app(state.clone());

    // No flag set: logins proceed.
    let (status, _, _) = get(&app, &authorize_uri()).await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    // Operators raise the flag at runtime; the broker answers 503.
    state
        .cache
        .set_bytes("outage:digid", b"true", std::time::Duration::ZERO)
        .await
        .unwrap();
    let (status, _, body) = get(&app, &authorize_uri()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(error["error"], "temporarily_unavailable");
}

#[tokio::test]
async fn expired_relay_state_lands_on_the_client_error_page() {
    let app = test_app("").await;

    let artifact = crate::saml::encode_mock_artifact("999991772");
    let uri = format!(
        "/acs?{}",
        serde_urlencoded::to_string([
            ("SAMLart", artifact.as_str()),
            ("RelayState", "stale-token"),
            ("client_id", "test_client"),
        ])
        .unwrap()
    );
    let (status, headers, _) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "http://localhost:3000/error");
}

#[tokio::test]
async fn health_endpoints_answer() {
    let app = test_app("").await;

    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["cache"]["healthy"], true);

    let (status, _, _) = get(&app, "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = get(&app, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
}
