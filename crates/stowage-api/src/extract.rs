//! Caller identity extraction.
//!
//! Authentication happens upstream; the gateway forwards the resolved caller in
//! `X-User-Id`, `X-User-Role` and `X-Tenant-Id`. The client address comes from
//! `X-Forwarded-For` (honouring `TRUSTED_PROXY_COUNT`), then `X-Real-IP`, then
//! the socket peer.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{request::Parts, HeaderMap};
use std::net::{IpAddr, SocketAddr};
use stowage_core::{AppError, Role, UploadContext};

use crate::error::HttpAppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

const DEFAULT_TRUSTED_PROXY_COUNT: usize = 1;

/// Request-scoped caller, usable alongside `Multipart`.
#[derive(Debug, Clone)]
pub struct Caller(pub UploadContext);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let tenant_id = header_str(headers, TENANT_ID_HEADER).ok_or_else(|| {
            HttpAppError(AppError::InvalidInput(
                "Missing X-Tenant-Id header".to_string(),
            ))
        })?;

        let socket_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Caller(UploadContext {
            user_id: header_str(headers, USER_ID_HEADER).map(String::from),
            role: header_str(headers, USER_ROLE_HEADER)
                .map(Role::parse)
                .unwrap_or(Role::Student),
            tenant_id: tenant_id.to_string(),
            client_ip: client_ip(headers, socket_addr.as_ref(), trusted_proxy_count()),
        }))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn trusted_proxy_count() -> usize {
    std::env::var("TRUSTED_PROXY_COUNT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_TRUSTED_PROXY_COUNT)
}

/// Resolve the client address. With N trusted proxies the client is the entry
/// just before the last N in `X-Forwarded-For`.
pub fn client_ip(
    headers: &HeaderMap,
    socket_addr: Option<&SocketAddr>,
    trusted_proxy_count: usize,
) -> Option<IpAddr> {
    if let Some(ip) = header_str(headers, "x-forwarded-for")
        .and_then(|value| from_forwarded_for(value, trusted_proxy_count))
    {
        return Some(ip);
    }

    if let Some(ip) = header_str(headers, "x-real-ip").and_then(|v| v.parse().ok()) {
        return Some(ip);
    }

    socket_addr.map(|addr| addr.ip())
}

fn from_forwarded_for(value: &str, trusted_proxy_count: usize) -> Option<IpAddr> {
    let chain: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let candidate = if trusted_proxy_count == 0 || chain.len() <= trusted_proxy_count {
        chain.last()
    } else {
        chain.get(chain.len() - trusted_proxy_count - 1)
    };
    candidate.and_then(|ip| ip.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_forwarded_for_skips_trusted_proxies() {
        let map = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(
            client_ip(&map, None, 1),
            Some("203.0.113.7".parse().unwrap())
        );
        assert_eq!(client_ip(&map, None, 0), Some("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_falls_back_to_real_ip_then_socket() {
        let map = headers(&[("x-forwarded-for", "garbage"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(
            client_ip(&map, None, 1),
            Some("198.51.100.2".parse().unwrap())
        );

        let socket: SocketAddr = "192.0.2.1:5555".parse().unwrap();
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(&socket), 1),
            Some("192.0.2.1".parse().unwrap())
        );
        assert_eq!(client_ip(&HeaderMap::new(), None, 1), None);
    }
}
