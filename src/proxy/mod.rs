//! Reverse proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Non-monitoring request
//!     → dispatch (forwardable method?) ── no ──▶ 404 ApiError::NotFound
//!     → forwarder.rs
//!         → before_forward hook
//!         → upstream (30s deadline)
//!         → CORS injection, after_forward hook
//!         → stream body back
//!     → on failure: on_error hook, 502 while the response is still writable
//! ```

pub mod error;
pub mod forwarder;
pub mod hooks;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    response::{IntoResponse, Response},
    Extension,
};

use crate::http::request::RequestContext;
use crate::http::response::ApiError;
use crate::http::server::AppState;

pub use error::{ProxyError, ResponseProgress};
pub use forwarder::{Forwarder, Target};
pub use hooks::{ProxyHooks, TracingHooks};

/// Methods relayed to the print server.
pub const FORWARDED_METHODS: [Method; 5] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
];

pub fn is_forwardable(method: &Method) -> bool {
    FORWARDED_METHODS.contains(method)
}

/// Catch-all handler: forward or 404.
pub async fn dispatch(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    request: Request<Body>,
) -> Response {
    if !is_forwardable(request.method()) {
        tracing::debug!(method = %ctx.method, path = %ctx.path, "No route matched");
        return ApiError::NotFound {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
        }
        .into_response();
    }

    state.forwarder.forward(request, &ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwardable_methods() {
        assert!(is_forwardable(&Method::GET));
        assert!(is_forwardable(&Method::POST));
        assert!(is_forwardable(&Method::DELETE));
        assert!(!is_forwardable(&Method::PATCH));
        assert!(!is_forwardable(&Method::OPTIONS));
    }
}
