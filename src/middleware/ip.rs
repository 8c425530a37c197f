use axum::{
    extract::{connect_info::ConnectInfo, FromRef, FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use crate::state::AppState;

/// Extract client IP from proxy headers and optional transport metadata.
///
/// Proxy headers are client-controlled unless a trusted proxy rewrites them, so they
/// are only read when `trust_proxy` is set.
pub fn extract_ip_from_headers(headers: &HeaderMap, fallback: Option<IpAddr>, trust_proxy: bool) -> IpAddr {
    if !trust_proxy {
        return fallback.unwrap_or(IpAddr::from([127, 0, 0, 1]));
    }
    if let Some(h) = headers.get("x-forwarded-for").and_then(|hv| hv.to_str().ok()) {
        if let Some(first) = h.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }
    if let Some(h) = headers.get("x-real-ip").and_then(|hv| hv.to_str().ok()) {
        if let Ok(ip) = h.trim().parse::<IpAddr>() {
            return ip;
        }
    }
    fallback.unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

/// Client address of a full request (middleware side).
pub fn client_ip(req: &Request, trust_proxy: bool) -> IpAddr {
    let remote = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    extract_ip_from_headers(req.headers(), remote, trust_proxy)
}

/// Client address as a handler extractor. Never rejects; without connection info
/// (tests, custom services) it falls back to loopback.
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

impl<S> FromRequestParts<S> for ClientIp
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trust_proxy = AppState::from_ref(state).config.server.trust_proxy_headers;
        let remote = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
        Ok(ClientIp(extract_ip_from_headers(&parts.headers, remote, trust_proxy)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_wins_behind_a_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let ip = extract_ip_from_headers(&headers, Some(IpAddr::from([192, 168, 1, 1])), true);
        assert_eq!(ip, IpAddr::from([203, 0, 113, 7]));
    }

    #[test]
    fn forwarded_headers_are_ignored_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.8"));
        let remote = IpAddr::from([192, 168, 1, 1]);
        assert_eq!(extract_ip_from_headers(&headers, Some(remote), false), remote);
    }

    #[test]
    fn falls_back_to_loopback() {
        let headers = HeaderMap::new();
        assert_eq!(extract_ip_from_headers(&headers, None, true), IpAddr::from([127, 0, 0, 1]));
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
        assert_eq!(
            extract_ip_from_headers(&headers, Some(IpAddr::from([10, 1, 1, 1])), true),
            IpAddr::from([10, 1, 1, 1])
        );
    }
}
