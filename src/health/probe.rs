//! Active upstream probing.
//!
//! # Responsibilities
//! - Call the print server's own health path on demand
//! - Report status, body and latency, or the classified failure

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request, Uri};
use http_body_util::{BodyExt, Limited};
use serde_json::Value;

use crate::proxy::forwarder::{upstream_client, Target, UpstreamClient};
use crate::proxy::ProxyError;
use crate::resilience::timeouts::with_deadline;

/// Path probed on the upstream.
pub const UPSTREAM_HEALTH_PATH: &str = "/health";

/// Largest probe body kept for the report.
const MAX_PROBE_BODY: usize = 64 * 1024;

/// Result of one probe.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// 2xx from the upstream.
    Healthy {
        status: u16,
        body: Value,
        latency: Duration,
    },
    /// The upstream answered with a non-success status.
    Unhealthy { status: u16, body: Value },
    /// No usable answer at all.
    Failed(ProxyError),
}

pub struct UpstreamProbe {
    client: UpstreamClient,
    target: Target,
    timeout: Duration,
}

impl UpstreamProbe {
    pub fn new(target: Target, timeout: Duration) -> Self {
        Self {
            client: upstream_client(timeout),
            target,
            timeout,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub async fn check(&self) -> ProbeOutcome {
        let start = Instant::now();
        let path: Uri = match UPSTREAM_HEALTH_PATH.parse() {
            Ok(uri) => uri,
            Err(e) => return ProbeOutcome::Failed(ProxyError::InvalidUri(format!("{}", e))),
        };
        let uri = match self.target.uri_for(&path) {
            Ok(uri) => uri,
            Err(e) => return ProbeOutcome::Failed(e),
        };

        let request = match Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::HOST, self.target.authority())
            .header(header::USER_AGENT, "print-proxy-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => return ProbeOutcome::Failed(ProxyError::InvalidUri(e.to_string())),
        };

        let response = match with_deadline(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let err = ProxyError::classify(&e);
                tracing::warn!(upstream = %self.target.display(), error = %err, "Upstream probe failed: connection error");
                return ProbeOutcome::Failed(err);
            }
            Err(elapsed) => {
                tracing::warn!(upstream = %self.target.display(), "Upstream probe failed: timeout");
                return ProbeOutcome::Failed(elapsed.into());
            }
        };

        let status = response.status();
        let body = match with_deadline(self.timeout, Limited::new(response.into_body(), MAX_PROBE_BODY).collect()).await {
            Ok(Ok(collected)) => parse_body(&collected.to_bytes()),
            Ok(Err(e)) => Value::String(format!("<unreadable body: {}>", e)),
            Err(elapsed) => Value::String(format!("<body {}>", elapsed)),
        };

        if status.is_success() {
            ProbeOutcome::Healthy {
                status: status.as_u16(),
                body,
                latency: start.elapsed(),
            }
        } else {
            tracing::warn!(upstream = %self.target.display(), status = %status, "Upstream probe failed: non-success status");
            ProbeOutcome::Unhealthy {
                status: status.as_u16(),
                body,
            }
        }
    }
}

/// JSON if it parses, the raw text otherwise.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
