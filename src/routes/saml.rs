//! Assertion consumer and the development-only mock IdP pages.

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::AppState;
use crate::oidc::OidcError;
use crate::routes::oidc::html_escape;
use crate::saml::encode_mock_artifact;

/// Return leg from the IdP. `client_id` is an optional extra our own
/// redirect URLs carry so an expired login can still land on the right
/// error page.
#[derive(Debug, Deserialize)]
pub struct AcsQuery {
    #[serde(rename = "SAMLart")]
    pub saml_artifact: String,
    #[serde(rename = "RelayState")]
    pub relay_state: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Assertion Consumer Service. Resolves the artifact over the back channel
/// and sends the browser back to the client with an authorization code.
#[tracing::instrument(name = "saml.acs", skip_all)]
pub async fn acs(
    State(state): State<AppState>,
    Query(query): Query<AcsQuery>,
) -> Result<Response, OidcError> {
    let redirect = state
        .provider
        .resume_from_assertion(
            &query.relay_state,
            &query.saml_artifact,
            query.client_id.as_deref(),
        )
        .await?;
    Ok(Redirect::to(&redirect).into_response())
}

#[derive(Debug, Deserialize)]
pub struct MockIdpQuery {
    #[serde(rename = "RelayState")]
    pub relay_state: String,
}

#[derive(Debug, Deserialize)]
pub struct MockLoginQuery {
    #[serde(rename = "RelayState")]
    pub relay_state: String,
    pub bsn: String,
}

/// Development-only stand-in for the upstream IdP: a page that asks for a
/// test BSN. Configuration validation keeps the mock binding out of
/// production, so this route never faces real users.
#[tracing::instrument(name = "saml.mock_idp", skip_all)]
pub async fn mock_idp(Query(query): Query<MockIdpQuery>) -> impl IntoResponse {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Mock IdP</title></head>
<body>
<h1>Mock identity provider</h1>
<form method="get" action="/mock-idp/login">
<input type="hidden" name="RelayState" value="{}">
<label>BSN <input type="text" name="bsn" value="999991772"></label>
<button type="submit">Sign in</button>
</form>
</body>
</html>"#,
        html_escape(&query.relay_state),
    ))
}

/// Completes a mock login by bouncing straight back to the ACS with a
/// mock artifact wrapping the entered BSN.
#[tracing::instrument(name = "saml.mock_idp_login", skip_all)]
pub async fn mock_idp_login(
    Query(query): Query<MockLoginQuery>,
) -> Result<Response, OidcError> {
    let artifact = encode_mock_artifact(&query.bsn);
    let target = format!(
        "/acs?{}",
        serde_urlencoded::to_string([
            ("SAMLart", artifact.as_str()),
            ("RelayState", query.relay_state.as_str()),
        ])
        .map_err(|e| OidcError::Internal(e.to_string()))?
    );
    Ok(Redirect::to(&target).into_response())
}
