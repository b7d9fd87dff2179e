//! Client address and user agent capture.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};

use super::state::HasProxySettings;
use crate::session::RequestContext;

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Determine the client address.
///
/// With `num_proxies == 0`, or when `X-Forwarded-For` is absent, this is the
/// socket peer. Otherwise it is the `X-Forwarded-For` entry `num_proxies`
/// places from the right, clamped to the list length. Anything that does not
/// parse as an IP address yields `None`.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    num_proxies: usize,
) -> Option<String> {
    let forwarded = (num_proxies > 0)
        .then(|| source.headers().get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok());

    let candidate = match forwarded {
        Some(header_value) => forwarded_client(header_value, num_proxies)?.to_string(),
        None => source
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())?,
    };

    candidate.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}

fn forwarded_client(header_value: &str, num_proxies: usize) -> Option<&str> {
    let entries: Vec<&str> = header_value.split(',').collect();
    let from_right = num_proxies.min(entries.len());
    entries
        .get(entries.len() - from_right)
        .copied()
        .map(str::trim)
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Extractor for the audit details recorded on new refresh sessions.
pub struct ClientContext(pub RequestContext);

impl<S> FromRequestParts<S> for ClientContext
where
    S: HasProxySettings + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientContext(RequestContext {
            user_agent: user_agent(&parts.headers),
            ip_address: extract_client_ip(&*parts, state.num_proxies()),
        }))
    }
}
