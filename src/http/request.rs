//! Per-request context and request IDs.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Capture the in-flight request context (method, path, origin, client
//!   IP, transport) once, at arrival
//! - Track in-flight requests until the response body is done and record
//!   per-request metrics
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The context lives in request extensions and is dropped with the request

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Method, Request},
    middleware::Next,
    response::Response,
    Extension,
};
use http_body_util::BodyExt;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::net::InFlightTracker;
use crate::observability::metrics;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Which listener accepted the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Https,
}

impl Transport {
    pub fn scheme(&self) -> &'static str {
        match self {
            Transport::Http => "http",
            Transport::Https => "https",
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Https)
    }
}

/// Generates `x-request-id` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// What the pipeline knows about an in-flight request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub origin: Option<String>,
    pub client_ip: IpAddr,
    pub transport: Transport,
    pub request_id: String,
}

impl RequestContext {
    pub fn from_request<B>(req: &Request<B>, client: SocketAddr, transport: Transport) -> Self {
        let header_str = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v: &HeaderValue| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            method: req.method().clone(),
            path: req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            origin: header_str("origin"),
            client_ip: client.ip().to_canonical(),
            transport,
            request_id: header_str(X_REQUEST_ID).unwrap_or_else(|| "unknown".to_string()),
        }
    }

    pub fn is_tls(&self) -> bool {
        self.transport.is_tls()
    }
}

/// Build the request context and hold an in-flight guard for the request.
pub async fn request_context_middleware(
    State(tracker): State<InFlightTracker>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    Extension(transport): Extension<Transport>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let guard = tracker.track();
    let ctx = RequestContext::from_request(&req, client, transport);

    tracing::trace!(
        seq = guard.seq(),
        request_id = %ctx.request_id,
        method = %ctx.method,
        path = %ctx.path,
        client = %ctx.client_ip,
        tls = ctx.is_tls(),
        "Request received"
    );

    let method = ctx.method.clone();
    req.extensions_mut().insert(ctx);
    let response = next.run(req).await;

    metrics::record_request(method.as_str(), response.status().as_u16(), start);

    // Streamed bodies outlive this future; the guard goes with the body.
    let (parts, body) = response.into_parts();
    let body = body.map_frame(move |frame| {
        let _held = &guard;
        frame
    });
    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_captures_request_fields() {
        let req = Request::builder()
            .method("POST")
            .uri("/jobs?copies=2")
            .header("origin", "https://app.example")
            .header(X_REQUEST_ID, "abc-123")
            .body(())
            .unwrap();
        let client: SocketAddr = "[::ffff:192.168.1.5]:5555".parse().unwrap();

        let ctx = RequestContext::from_request(&req, client, Transport::Https);
        assert_eq!(ctx.method, Method::POST);
        assert_eq!(ctx.path, "/jobs?copies=2");
        assert_eq!(ctx.origin.as_deref(), Some("https://app.example"));
        assert_eq!(ctx.client_ip, IpAddr::from([192, 168, 1, 5]));
        assert_eq!(ctx.request_id, "abc-123");
        assert!(ctx.is_tls());
    }

    #[test]
    fn request_ids_are_unique() {
        let req = Request::new(());
        let mut maker = UuidRequestId;
        let a = maker.make_request_id(&req).unwrap();
        let b = maker.make_request_id(&req).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
