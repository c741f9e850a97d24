use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

use crate::cache::CacheError;
use crate::ratelimit::RateLimitError;
use crate::saml::SamlError;

/// Everything the authorize/token/userinfo flow can fail with.
///
/// Two rules shape the taxonomy. Redirect-class errors are only ever built
/// after the redirect_uri has been validated against the client registry;
/// an unvalidated redirect target gets a plain 400. And upstream or cache
/// detail never reaches the caller: it is logged at the point of failure,
/// then collapsed to a generic variant here.
#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    /// client_id not in the registry. No redirect: none of the client's
    /// URIs are trusted.
    #[error("unknown client")]
    InvalidClient,

    /// redirect_uri not on the client's allow-list. No redirect.
    #[error("redirect_uri not allowed for this client")]
    InvalidRedirectUri,

    /// Standard OIDC error delivered to a pre-validated redirect_uri.
    #[error("{error}: {description}")]
    Redirect {
        error: &'static str,
        description: String,
        redirect_uri: String,
        state: String,
    },

    #[error("too many requests from this address")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("all identity providers are at capacity")]
    TooBusy,

    #[error("identity provider outage in progress")]
    ProviderOutage,

    #[error("identity provider unreachable")]
    ProviderUnreachable,

    /// Generic refusal. When the caller identified a registered client,
    /// its configured error page is used instead of a bare 401.
    #[error("not authorized")]
    Unauthorized { error_page: Option<String> },

    /// Authorization code absent, already spent, or past its TTL. One
    /// message for all three: callers must not learn which.
    #[error("authorization code invalid or expired")]
    ExpiredCode,

    /// Code exchange failed verification (PKCE, client or redirect
    /// mismatch).
    #[error("invalid grant: {0}")]
    InvalidGrant(&'static str),

    #[error("internal error")]
    Internal(String),
}

impl IntoResponse for OidcError {
    fn into_response(self) -> Response {
        match self {
            OidcError::InvalidClient => oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_client",
                "unknown client",
            ),
            OidcError::InvalidRedirectUri => oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "redirect_uri not allowed for this client",
            ),
            OidcError::Redirect {
                error,
                description,
                redirect_uri,
                state,
            } => {
                let target = format!(
                    "{}?{}",
                    redirect_uri,
                    serde_urlencoded::to_string([
                        ("error", error),
                        ("error_description", description.as_str()),
                        ("state", state.as_str()),
                    ])
                    .unwrap_or_default()
                );
                Redirect::to(&target).into_response()
            }
            OidcError::TooManyRequests { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after_secs.to_string())],
                Json(json!({
                    "error": "temporarily_unavailable",
                    "error_description": "too many requests from this address",
                })),
            )
                .into_response(),
            OidcError::TooBusy => oauth_error(
                StatusCode::TOO_MANY_REQUESTS,
                "temporarily_unavailable",
                "it is too busy at the moment, please try again later",
            ),
            OidcError::ProviderOutage | OidcError::ProviderUnreachable => oauth_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "temporarily_unavailable",
                "the identity provider is currently unavailable",
            ),
            OidcError::Unauthorized { error_page } => match error_page {
                Some(page) => Redirect::to(&page).into_response(),
                None => oauth_error(StatusCode::UNAUTHORIZED, "access_denied", "not authorized"),
            },
            OidcError::ExpiredCode => oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "authorization code invalid or expired",
            ),
            OidcError::InvalidGrant(description) => {
                oauth_error(StatusCode::BAD_REQUEST, "invalid_grant", description)
            }
            OidcError::Internal(detail) => {
                tracing::error!(detail = %detail, "internal error");
                oauth_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "internal error",
                )
            }
        }
    }
}

fn oauth_error(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "error_description": description,
        })),
    )
        .into_response()
}

impl From<RateLimitError> for OidcError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::TooManyRequestsFromOrigin { retry_after_secs } => {
                OidcError::TooManyRequests { retry_after_secs }
            }
            RateLimitError::TooBusy => OidcError::TooBusy,
            RateLimitError::ProviderOutage => OidcError::ProviderOutage,
            RateLimitError::ExpectedCacheValue(key) => {
                OidcError::Internal(format!("missing runtime setting '{}'", key))
            }
            RateLimitError::Cache(e) => OidcError::Internal(e.to_string()),
        }
    }
}

impl From<SamlError> for OidcError {
    fn from(err: SamlError) -> Self {
        match err {
            SamlError::ScopingAttributesNotAllowed => OidcError::Unauthorized { error_page: None },
            SamlError::Unauthorized => OidcError::Unauthorized { error_page: None },
            SamlError::ProviderUnreachable(detail) => {
                tracing::error!(detail = %detail, "identity provider unreachable");
                OidcError::ProviderUnreachable
            }
            SamlError::Internal(detail) => OidcError::Internal(detail),
        }
    }
}

impl From<CacheError> for OidcError {
    fn from(err: CacheError) -> Self {
        OidcError::Internal(err.to_string())
    }
}
