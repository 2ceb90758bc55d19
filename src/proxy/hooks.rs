//! Injection points around a forwarded exchange.
//!
//! The forwarder calls these synchronously: `before_forward` right before
//! the upstream request is sent, `after_forward` once upstream headers are
//! in and CORS has been applied, and `on_error` for any upstream failure,
//! including failures in the middle of a streamed body.

use axum::body::Body;
use axum::http::{response, Request};

use crate::http::request::RequestContext;
use crate::proxy::error::{ProxyError, ResponseProgress};

pub trait ProxyHooks: Send + Sync {
    fn before_forward(&self, _request: &mut Request<Body>, _ctx: &RequestContext) {}

    fn after_forward(&self, _response: &mut response::Parts, _ctx: &RequestContext) {}

    fn on_error(&self, _error: &ProxyError, _ctx: &RequestContext, _progress: ResponseProgress) {}
}

/// Default hooks: structured log lines only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

impl ProxyHooks for TracingHooks {
    fn before_forward(&self, request: &mut Request<Body>, ctx: &RequestContext) {
        tracing::debug!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            upstream = %request.uri(),
            client = %ctx.client_ip,
            "Proxying request"
        );
    }

    fn after_forward(&self, response: &mut response::Parts, ctx: &RequestContext) {
        tracing::debug!(
            request_id = %ctx.request_id,
            status = %response.status,
            path = %ctx.path,
            "Upstream responded"
        );
    }

    fn on_error(&self, error: &ProxyError, ctx: &RequestContext, progress: ResponseProgress) {
        match progress {
            ResponseProgress::NotStarted => tracing::error!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.path,
                code = error.code(),
                error = %error,
                "Upstream request failed"
            ),
            ResponseProgress::HeadersSent => tracing::warn!(
                request_id = %ctx.request_id,
                path = %ctx.path,
                code = error.code(),
                error = %error,
                "Upstream body failed after headers were sent; closing connection"
            ),
        }
    }
}
