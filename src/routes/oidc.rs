//! OIDC endpoint handlers: discovery, JWKS, authorize, token, userinfo.

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use http::header;

use crate::AppState;
use crate::oidc::{AuthorizeOutcome, AuthorizeRequest, OidcError, TokenRequest};
use crate::routes::ClientIp;

#[tracing::instrument(name = "oidc.discovery", skip(state))]
pub async fn discovery(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.provider.discovery())
}

#[tracing::instrument(name = "oidc.jwks", skip(state))]
pub async fn jwks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.provider.jwks())
}

/// The authorization endpoint. Hands the browser either a redirect to the
/// IdP, an auto-submitting SAML POST form, or a login-method chooser.
#[tracing::instrument(name = "oidc.authorize", skip(state, request), fields(client_id = %request.client_id))]
pub async fn authorize(
    State(state): State<AppState>,
    ClientIp(origin): ClientIp,
    Query(request): Query<AuthorizeRequest>,
) -> Result<Response, OidcError> {
    let outcome = state.provider.authorize(origin, request).await?;
    Ok(match outcome {
        AuthorizeOutcome::Redirect(url) => Redirect::to(&url).into_response(),
        AuthorizeOutcome::PostForm {
            sso_url,
            saml_request,
            relay_state,
        } => Html(saml_post_page(&sso_url, &saml_request, &relay_state)).into_response(),
        AuthorizeOutcome::LoginChooser {
            client_name,
            methods,
            request,
        } => Html(login_chooser_page(&client_name, &methods, &request)?).into_response(),
    })
}

#[tracing::instrument(name = "oidc.token", skip(state, request), fields(client_id = %request.client_id))]
pub async fn token(
    State(state): State<AppState>,
    axum::Form(request): axum::Form<TokenRequest>,
) -> Result<Response, OidcError> {
    let response = state.provider.token(request).await?;
    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response())
}

/// GET and POST share this handler; the token travels in the
/// Authorization header either way.
#[tracing::instrument(name = "oidc.userinfo", skip_all)]
pub async fn userinfo(
    State(state): State<AppState>,
    headers: http::HeaderMap,
) -> Result<Response, OidcError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(OidcError::Unauthorized { error_page: None })?;

    let claims = state.provider.userinfo(bearer).await?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(claims)).into_response())
}

/// Auto-submitting form for the SAML POST binding.
fn saml_post_page(sso_url: &str, saml_request: &str, relay_state: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Signing in</title></head>
<body onload="document.forms[0].submit()">
<noscript><p>Press the button to continue signing in.</p></noscript>
<form method="post" action="{}">
<input type="hidden" name="SAMLRequest" value="{}">
<input type="hidden" name="RelayState" value="{}">
<noscript><button type="submit">Continue</button></noscript>
</form>
</body>
</html>"#,
        html_escape(sso_url),
        html_escape(saml_request),
        html_escape(relay_state),
    )
}

/// Chooser shown when more than one login method applies. Each link is the
/// same authorize request narrowed to one method via login_hint.
fn login_chooser_page(
    client_name: &str,
    methods: &[String],
    request: &AuthorizeRequest,
) -> Result<String, OidcError> {
    let mut links = String::new();
    for method in methods {
        let mut narrowed = request.clone();
        narrowed.login_hint = Some(method.clone());
        let query = serde_urlencoded::to_string(&narrowed)
            .map_err(|e| OidcError::Internal(e.to_string()))?;
        links.push_str(&format!(
            "<li><a href=\"/authorize?{}\">{}</a></li>\n",
            html_escape(&query),
            html_escape(method),
        ));
    }
    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Choose a login method</title></head>
<body>
<h1>Sign in to {}</h1>
<ul>
{}</ul>
</body>
</html>"#,
        html_escape(client_name),
        links,
    ))
}

pub(crate) fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
