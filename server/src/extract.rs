//! Request metadata: cookies, the session token, the client address and the operator flag.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, header, request::Parts};
use mailtrack_core::core::Visitor;
use std::convert::Infallible;
use std::net::SocketAddr;

/// Cookie carrying the signed capability token.
pub const TOKEN_COOKIE: &str = "qtk";
/// Cookie carrying the operator password after login.
pub const ADMIN_COOKIE: &str = "X-Admin-Token";

pub fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"'))
        .filter(|v| !v.is_empty())
}

/// `Set-Cookie` value for an HttpOnly, `SameSite=Lax` cookie scoped to the whole site.
pub fn set_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie =
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `X-Real-IP`, then the first `X-Forwarded-For` hop, then the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(ip) = header_value(headers, "x-real-ip") {
        return ip.to_string();
    }
    if let Some(first) = header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// User agent and client address of the current request.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub user_agent: String,
    pub ip: String,
}

impl ClientInfo {
    pub fn visitor(&self) -> Visitor {
        Visitor {
            user_agent: self.user_agent.clone(),
            client_ip: self.ip.clone(),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            user_agent,
            ip: client_ip(&parts.headers, peer),
        })
    }
}

/// Capability token presented by the client. The cookie wins over a bearer header.
#[derive(Debug, Clone, Default)]
pub struct SessionToken(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for SessionToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = cookie(&parts.headers, TOKEN_COOKIE)
            .or_else(|| bearer_token(&parts.headers))
            .map(str::to_string);
        Ok(Self(token))
    }
}

/// Whether the request comes from the logged-in operator.
///
/// Set by [`crate::middleware::identify_operator`]; absent means not the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Operator(pub bool);

impl<S: Send + Sync> FromRequestParts<S> for Operator {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Operator>()
            .copied()
            .unwrap_or_default())
    }
}
