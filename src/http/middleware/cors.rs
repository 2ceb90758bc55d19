//! Cross-origin middleware.
//!
//! Runs before everything else. Preflights are answered here and never
//! reach the rate limiter or the upstream. For other requests the decided
//! headers are stored in the request extensions, so the forwarder injects
//! exactly the same values into proxied responses, and applied again to
//! whatever response comes back.
//!
//! Origin policy: an allowed origin (listed, or any origin when `*` is
//! configured) is echoed back verbatim because credentials are always
//! allowed. A request without an `Origin` header gets `*`. A disallowed
//! origin gets no `Access-Control-Allow-Origin` at all.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::ProxyConfig;

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOWED_HEADERS: &str = "Content-Type, Authorization, X-Requested-With, X-Forwarded-For";
const PREFLIGHT_MAX_AGE: &str = "86400";

pub const REQUEST_PRIVATE_NETWORK: HeaderName =
    HeaderName::from_static("access-control-request-private-network");
pub const ALLOW_PRIVATE_NETWORK: HeaderName =
    HeaderName::from_static("access-control-allow-private-network");

/// Allowed-origin policy built from configuration.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_any: bool,
    origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(origins: Vec<String>) -> Self {
        Self {
            allow_any: origins.iter().any(|o| o == "*"),
            origins,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.allowed_origins.clone())
    }

    /// Value for `Access-Control-Allow-Origin`, if any.
    pub fn allow_origin(&self, origin: Option<&HeaderValue>) -> Option<HeaderValue> {
        let Some(origin) = origin else {
            return Some(HeaderValue::from_static("*"));
        };
        let allowed = self.allow_any
            || origin
                .to_str()
                .map(|o| self.origins.iter().any(|allowed| allowed == o))
                .unwrap_or(false);
        allowed.then(|| origin.clone())
    }

    /// Decide the CORS headers for one request.
    pub fn decide(&self, headers: &HeaderMap) -> CorsDecision {
        CorsDecision {
            allow_origin: self.allow_origin(headers.get(header::ORIGIN)),
            private_network: headers.contains_key(REQUEST_PRIVATE_NETWORK),
        }
    }
}

/// CORS headers decided for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsDecision {
    pub allow_origin: Option<HeaderValue>,
    pub private_network: bool,
}

impl CorsDecision {
    /// Decision used when no middleware ran (bare `*`).
    pub fn wildcard() -> Self {
        Self {
            allow_origin: Some(HeaderValue::from_static("*")),
            private_network: false,
        }
    }

    /// Write the decided headers, overwriting whatever is there.
    pub fn apply(&self, headers: &mut HeaderMap) {
        match &self.allow_origin {
            Some(origin) => {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            }
            None => {
                headers.remove(header::ACCESS_CONTROL_ALLOW_ORIGIN);
            }
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        if self.private_network {
            headers.insert(ALLOW_PRIVATE_NETWORK, HeaderValue::from_static("true"));
        }

        let varies_on_origin = headers
            .get_all(header::VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.split(',').any(|p| p.trim().eq_ignore_ascii_case("origin")));
        if !varies_on_origin {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
    }
}

pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let decision = policy.decide(req.headers());

    if req.method() == Method::OPTIONS {
        tracing::debug!(
            path = %req.uri().path(),
            origin_allowed = decision.allow_origin.is_some(),
            "Answering preflight"
        );
        let mut response = StatusCode::OK.into_response();
        decision.apply(response.headers_mut());
        response.headers_mut().insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE),
        );
        return response;
    }

    req.extensions_mut().insert(decision.clone());
    let mut response = next.run(req).await;
    decision.apply(response.headers_mut());
    response
}
