//! Monitoring endpoints.
//!
//! # Routes
//! ```text
//! GET /proxy-health     liveness, never touches the upstream
//! GET /status           process and proxy state
//! GET /test-connection  probes {target}/health, 200 or 502
//! GET /cert-info        resolved TLS credential summary
//! GET /download-cert    public certificate for client trust stores
//! ```
//!
//! All of these bypass the rate limiter. Other methods on these paths fall
//! through to the forwarder like any other request.

pub mod handlers;

pub const PROXY_HEALTH: &str = "/proxy-health";
pub const STATUS: &str = "/status";
pub const TEST_CONNECTION: &str = "/test-connection";
pub const CERT_INFO: &str = "/cert-info";
pub const DOWNLOAD_CERT: &str = "/download-cert";
