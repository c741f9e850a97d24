pub mod health;
pub mod oidc;
pub mod saml;

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use http::{HeaderMap, request::Parts};

use crate::AppState;

/// Extractor form of [`client_ip`] for handlers.
pub struct ClientIp(pub IpAddr);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let connect_info = parts.extensions.get::<ConnectInfo<SocketAddr>>();
        Ok(ClientIp(client_ip(
            &parts.headers,
            connect_info,
            state.config.server.trust_proxy_headers,
        )))
    }
}

/// The IP address rate-limit counters are keyed by.
///
/// With `trust_proxy_headers` enabled the first X-Forwarded-For entry wins;
/// otherwise (and when the header is absent or malformed) the TCP peer
/// address is used. Connections without peer info fall back to loopback, so
/// in-process test requests share one counter.
pub fn client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy_headers: bool,
) -> IpAddr {
    if trust_proxy_headers
        && let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
        && let Ok(ip) = first.trim().parse()
    {
        return ip;
    }
    connect_info
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
