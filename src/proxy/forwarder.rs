//! Forwarding to the print server.
//!
//! Bodies are streamed in both directions; nothing is buffered. Dropping
//! the handler future (client went away) drops the in-flight upstream call
//! with it. A response body that goes quiet for longer than the upstream
//! timeout is cut off and the client connection aborted.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, uri::PathAndQuery, HeaderValue, Request, Uri, Version},
    response::Response,
};
use http_body_util::BodyExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::config::{Mode, ProxyConfig};
use crate::http::middleware::CorsDecision;
use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::proxy::error::{ProxyError, ResponseProgress};
use crate::proxy::hooks::{ProxyHooks, TracingHooks};
use crate::resilience::timeouts::{with_deadline, IdleTimeout, UPSTREAM_TIMEOUT};
use crate::security::headers;

pub type UpstreamClient = Client<HttpConnector, Body>;

/// Shared HTTP/1.1 client for upstream calls.
pub fn upstream_client(connect_timeout: Duration) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new())
        .http1_preserve_header_case(true)
        .http1_title_case_headers(false)
        .pool_idle_timeout(Duration::from_secs(90))
        .build(connector)
}

/// The upstream base URL split into the pieces requests are built from.
#[derive(Debug, Clone)]
pub struct Target {
    authority: String,
    base_path: String,
    display: String,
}

impl Target {
    pub fn new(url: &Url) -> Self {
        let host = url.host_str().unwrap_or("localhost");
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Self {
            authority,
            base_path: url.path().trim_end_matches('/').to_string(),
            display: url.as_str().trim_end_matches('/').to_string(),
        }
    }

    /// The target as reported to clients.
    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Upstream URI for an incoming URI: base path joined with the original
    /// path, query preserved.
    pub fn uri_for(&self, original: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = original
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/");
        Uri::builder()
            .scheme("http")
            .authority(self.authority.as_str())
            .path_and_query(format!("{}{}", self.base_path, path_and_query))
            .build()
            .map_err(|e| ProxyError::InvalidUri(e.to_string()))
    }
}

/// Forwards requests to the single configured upstream.
pub struct Forwarder {
    client: UpstreamClient,
    target: Target,
    host_header: HeaderValue,
    timeout: Duration,
    mode: Mode,
    hooks: Arc<dyn ProxyHooks>,
}

impl Forwarder {
    pub fn new(config: &ProxyConfig) -> Self {
        Self::with_hooks(config, Arc::new(TracingHooks))
    }

    pub fn with_hooks(config: &ProxyConfig, hooks: Arc<dyn ProxyHooks>) -> Self {
        let target = Target::new(&config.target_url);
        let host_header = HeaderValue::from_str(target.authority())
            .unwrap_or_else(|_| HeaderValue::from_static("localhost"));
        Self {
            client: upstream_client(UPSTREAM_TIMEOUT),
            target,
            host_header,
            timeout: UPSTREAM_TIMEOUT,
            mode: config.mode,
            hooks,
        }
    }

    /// Override the upstream deadline, which also bounds the gap between
    /// response body frames.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Forward one request and relay the upstream response.
    pub async fn forward(&self, req: Request<Body>, ctx: &RequestContext) -> Response {
        let cors = req
            .extensions()
            .get::<CorsDecision>()
            .cloned()
            .unwrap_or_else(CorsDecision::wildcard);

        let (mut parts, body) = req.into_parts();
        parts.uri = match self.target.uri_for(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => return self.fail(e, ctx),
        };
        parts.version = Version::HTTP_11;

        let original_host = parts.headers.get(header::HOST).cloned();
        headers::strip_hop_by_hop(&mut parts.headers);
        headers::set_forwarding_headers(
            &mut parts.headers,
            ctx.client_ip,
            ctx.transport.scheme(),
            original_host,
        );
        headers::rewrite_host(&mut parts.headers, &self.host_header);

        let mut upstream_req = Request::from_parts(parts, body);
        self.hooks.before_forward(&mut upstream_req, ctx);

        let upstream_resp = match with_deadline(self.timeout, self.client.request(upstream_req)).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return self.fail(ProxyError::classify(&e), ctx),
            Err(elapsed) => return self.fail(elapsed.into(), ctx),
        };

        let (mut parts, body) = upstream_resp.into_parts();
        headers::strip_hop_by_hop(&mut parts.headers);
        cors.apply(&mut parts.headers);
        self.hooks.after_forward(&mut parts, ctx);

        // A body error surfaces to hyper, which aborts the client connection.
        let hooks = Arc::clone(&self.hooks);
        let stream_ctx = ctx.clone();
        let body = IdleTimeout::new(body, self.timeout).map_err(move |e| {
            let err = ProxyError::classify(&*e);
            hooks.on_error(&err, &stream_ctx, ResponseProgress::HeadersSent);
            metrics::record_upstream_error(err.code());
            err
        });

        Response::from_parts(parts, Body::new(body))
    }

    fn fail(&self, err: ProxyError, ctx: &RequestContext) -> Response {
        self.hooks.on_error(&err, ctx, ResponseProgress::NotStarted);
        metrics::record_upstream_error(err.code());
        err.into_response_if_writable(ResponseProgress::NotStarted, self.target.display(), self.mode)
            .unwrap_or_else(|| Response::new(Body::empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Transport;
    use axum::http::StatusCode;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn target(url: &str) -> Target {
        Target::new(&Url::parse(url).unwrap())
    }

    #[test]
    fn uri_keeps_path_and_query() {
        let t = target("http://printer.lan:9100");
        let uri: Uri = "/jobs/7?format=pdf".parse().unwrap();
        assert_eq!(
            t.uri_for(&uri).unwrap().to_string(),
            "http://printer.lan:9100/jobs/7?format=pdf"
        );
    }

    #[test]
    fn base_path_is_prefixed() {
        let t = target("http://printer.lan/api/");
        let uri: Uri = "/print".parse().unwrap();
        assert_eq!(t.uri_for(&uri).unwrap().to_string(), "http://printer.lan/api/print");
        assert_eq!(t.display(), "http://printer.lan/api");
        assert_eq!(t.authority(), "printer.lan");
    }

    #[test]
    fn root_request_maps_to_root() {
        let t = target("http://127.0.0.1:3000/");
        let uri: Uri = "/".parse().unwrap();
        assert_eq!(t.uri_for(&uri).unwrap().to_string(), "http://127.0.0.1:3000/");
    }

    /// Upstream that sends headers and part of the body, then goes quiet
    /// while keeping the socket open.
    async fn stalling_upstream() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        addr
    }

    #[tokio::test]
    async fn stalled_upstream_body_is_cut_off() {
        let addr = stalling_upstream().await;
        let config = ProxyConfig {
            target_url: Url::parse(&format!("http://{}", addr)).unwrap(),
            ..ProxyConfig::default()
        };
        let forwarder = Forwarder::new(&config).with_timeout(Duration::from_millis(200));

        let req = Request::get("/labels/big").body(Body::empty()).unwrap();
        let client: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let ctx = RequestContext::from_request(&req, client, Transport::Http);

        let response = forwarder.forward(req, &ctx).await;
        assert_eq!(response.status(), StatusCode::OK);

        let collected = with_deadline(Duration::from_secs(5), response.into_body().collect())
            .await
            .expect("body should fail before the outer deadline");
        assert!(collected.is_err());
    }
}
