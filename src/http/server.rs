//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with monitoring routes and the proxy fallback
//! - Wire up middleware (request ID, CORS, rate limit, compression, tracing)
//! - Build one router per listener; both share the same state
//!
//! # Layer order (outermost first)
//! ```text
//! catch panic → transport extension → request id → request context → CORS
//!     → rate limit → compression → trace → timeout → handler
//! ```

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    body::Body,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use tower_http::{
    catch_panic::{CatchPanicLayer, ResponseForPanic},
    compression::CompressionLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{Mode, ProxyConfig};
use crate::health::UpstreamProbe;
use crate::http::middleware::{cors_middleware, CorsPolicy};
use crate::http::request::{request_context_middleware, Transport, UuidRequestId};
use crate::http::response::ApiError;
use crate::lifecycle::Lifecycle;
use crate::monitoring::{self, handlers};
use crate::net::{InFlightTracker, TlsStatus};
use crate::proxy::{self, Forwarder, ProxyHooks, TracingHooks};
use crate::resilience::timeouts::{PROBE_TIMEOUT, SERVER_TIMEOUT};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub forwarder: Arc<Forwarder>,
    pub probe: Arc<UpstreamProbe>,
    pub tls: Arc<TlsStatus>,
    pub lifecycle: Lifecycle,
    pub in_flight: InFlightTracker,
    pub started_at: Instant,
}

/// HTTP server for the proxy.
///
/// Owns everything the request pipeline shares across listeners.
pub struct HttpServer {
    state: AppState,
    cors: Arc<CorsPolicy>,
    limiter: Arc<RateLimiter>,
}

impl HttpServer {
    pub fn new(config: Arc<ProxyConfig>, tls: Arc<TlsStatus>, lifecycle: Lifecycle) -> Self {
        Self::with_hooks(config, tls, lifecycle, Arc::new(TracingHooks))
    }

    pub fn with_hooks(
        config: Arc<ProxyConfig>,
        tls: Arc<TlsStatus>,
        lifecycle: Lifecycle,
        hooks: Arc<dyn ProxyHooks>,
    ) -> Self {
        let forwarder = Forwarder::with_hooks(&config, hooks);
        let probe = UpstreamProbe::new(forwarder.target().clone(), PROBE_TIMEOUT);
        let cors = Arc::new(CorsPolicy::from_config(&config));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let state = AppState {
            config,
            forwarder: Arc::new(forwarder),
            probe: Arc::new(probe),
            tls,
            lifecycle,
            in_flight: InFlightTracker::new(),
            started_at: Instant::now(),
        };

        Self { state, cors, limiter }
    }

    /// Router for one listener.
    pub fn router(&self, transport: Transport) -> Router {
        Self::build_router(self.state.clone(), self.cors.clone(), self.limiter.clone(), transport)
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        state: AppState,
        cors: Arc<CorsPolicy>,
        limiter: Arc<RateLimiter>,
        transport: Transport,
    ) -> Router {
        let mode = state.config.mode;
        let in_flight = state.in_flight.clone();

        Router::new()
            .route(monitoring::PROXY_HEALTH, get(handlers::proxy_health).fallback(proxy::dispatch))
            .route(monitoring::STATUS, get(handlers::status).fallback(proxy::dispatch))
            .route(monitoring::TEST_CONNECTION, get(handlers::test_connection).fallback(proxy::dispatch))
            .route(monitoring::CERT_INFO, get(handlers::cert_info).fallback(proxy::dispatch))
            .route(monitoring::DOWNLOAD_CERT, get(handlers::download_cert).fallback(proxy::dispatch))
            .fallback(proxy::dispatch)
            .layer(TimeoutLayer::new(SERVER_TIMEOUT))
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
            .layer(middleware::from_fn_with_state(cors, cors_middleware))
            .layer(middleware::from_fn_with_state(in_flight, request_context_middleware))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(Extension(transport))
            .layer(catch_panic(mode))
            .with_state(state)
    }
}

/// Turns a panic anywhere in the pipeline into a JSON 500.
#[derive(Debug, Clone, Copy)]
pub struct PanicResponder {
    mode: Mode,
}

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, panic: Box<dyn Any + Send + 'static>) -> Response {
        let details = if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "unknown panic".to_string()
        };
        tracing::error!(details = %details, "Request pipeline panicked");
        ApiError::Internal { details, mode: self.mode }.into_response()
    }
}

fn catch_panic(mode: Mode) -> CatchPanicLayer<PanicResponder> {
    CatchPanicLayer::custom(PanicResponder { mode })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::{RateLimitConfig, TlsSettings};

    fn config(target: &str, max_requests: u32) -> ProxyConfig {
        ProxyConfig {
            bind_host: "127.0.0.1".into(),
            http_port: 8080,
            https_port: 8443,
            target_url: target.parse().unwrap(),
            allowed_origins: vec!["https://app.example".into()],
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(60),
                max_requests,
            },
            tls: TlsSettings::default(),
            mode: Mode::Development,
            metrics_address: None,
        }
    }

    fn app(config: ProxyConfig) -> Router {
        let server = HttpServer::new(
            Arc::new(config),
            Arc::new(TlsStatus::new(None)),
            Lifecycle::new(),
        );
        with_client(server.router(Transport::Http))
    }

    fn with_client(router: Router) -> Router {
        router.layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5000))))
    }

    struct PanickingHooks;

    impl ProxyHooks for PanickingHooks {
        fn before_forward(&self, _request: &mut Request<Body>, _ctx: &crate::http::request::RequestContext) {
            panic!("hook blew up");
        }
    }

    /// A target nothing listens on.
    fn dead_target() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_target_and_request_id() {
        let response = app(config("http://printer.local:3000", 10))
            .oneshot(get("/proxy-health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(!response.headers().contains_key("ratelimit-limit"));
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["target"], "http://printer.local:3000");
    }

    #[tokio::test]
    async fn client_request_id_is_kept() {
        let request = Request::builder()
            .uri("/proxy-health")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app(config("http://127.0.0.1:3000", 10)).oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn preflight_is_answered_locally() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/print/job")
            .header(header::ORIGIN, "https://app.example")
            .header("access-control-request-private-network", "true")
            .body(Body::empty())
            .unwrap();
        let response = app(config(&dead_target(), 10)).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "https://app.example");
        assert_eq!(headers["access-control-allow-credentials"], "true");
        assert_eq!(headers["access-control-allow-private-network"], "true");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn unmatched_method_is_not_found() {
        let request = Request::builder()
            .method(Method::PATCH)
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let response = app(config(&dead_target(), 10)).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("PATCH"));
        assert!(message.contains("/nonexistent"));
    }

    #[tokio::test]
    async fn dead_upstream_yields_bad_gateway() {
        let target = dead_target();
        let response = app(config(&target, 10)).oneshot(get("/jobs")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["target"], target.as_str());
        assert_eq!(body["code"], "ECONNREFUSED");
    }

    #[tokio::test]
    async fn rate_limit_spares_monitoring_paths() {
        let router = app(config(&dead_target(), 2));

        for _ in 0..2 {
            let response = router.clone().oneshot(get("/jobs")).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }
        let limited = router.clone().oneshot(get("/jobs")).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers().contains_key(header::RETRY_AFTER));

        for _ in 0..5 {
            let response = router.clone().oneshot(get("/proxy-health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn download_cert_without_tls_is_not_found() {
        let response = app(config(&dead_target(), 10))
            .oneshot(get("/download-cert"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn status_reports_state_and_config() {
        let response = app(config(&dead_target(), 10)).oneshot(get("/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["state"], "stopped");
        assert_eq!(body["httpsActive"], false);
        assert_eq!(body["pid"], std::process::id());
        assert_eq!(body["config"]["httpPort"], 8080);
    }

    #[tokio::test]
    async fn forwarding_panic_becomes_internal_error() {
        let server = HttpServer::with_hooks(
            Arc::new(config(&dead_target(), 10)),
            Arc::new(TlsStatus::new(None)),
            Lifecycle::new(),
            Arc::new(PanickingHooks),
        );
        let response = with_client(server.router(Transport::Http))
            .oneshot(get("/jobs"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(server.state().in_flight.active(), 0);
    }

    #[tokio::test]
    async fn middleware_panic_becomes_internal_error() {
        async fn explode(_req: Request<Body>, _next: middleware::Next) -> Response {
            panic!("middleware blew up");
        }

        let router = Router::new()
            .route("/", axum::routing::get(|| async { "ok" }))
            .layer(middleware::from_fn(explode))
            .layer(catch_panic(Mode::Development));
        let response = router.oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn in_flight_lasts_until_body_is_consumed() {
        let server = HttpServer::new(
            Arc::new(config(&dead_target(), 10)),
            Arc::new(TlsStatus::new(None)),
            Lifecycle::new(),
        );
        let response = with_client(server.router(Transport::Http))
            .oneshot(get("/proxy-health"))
            .await
            .unwrap();
        assert_eq!(server.state().in_flight.active(), 1);

        json_body(response).await;
        assert_eq!(server.state().in_flight.active(), 0);
    }

    #[tokio::test]
    async fn cert_info_reports_bound_https_port() {
        let tls = Arc::new(TlsStatus::new(None));
        tls.set_https_port(49321);
        tls.set_https_active(true);
        let server = HttpServer::new(Arc::new(config(&dead_target(), 10)), tls, Lifecycle::new());

        let response = with_client(server.router(Transport::Http))
            .oneshot(get("/cert-info"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["httpsPort"], 49321);
        assert_eq!(body["httpsEnabled"], true);
    }
}
