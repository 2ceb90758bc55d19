use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::config::ProxyConfig;
use crate::health::ProbeOutcome;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::net::TlsCredential;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub success: bool,
    pub status: &'static str,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub target: String,
    /// Seconds since startup.
    pub uptime: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCounts {
    pub in_flight: u64,
    pub served: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport<'a> {
    pub success: bool,
    pub state: &'static str,
    pub uptime: f64,
    pub pid: u32,
    pub memory: Option<MemoryUsage>,
    pub requests: RequestCounts,
    pub https_active: bool,
    pub platform: &'static str,
    pub arch: &'static str,
    pub mode: &'static str,
    pub version: &'static str,
    pub target: String,
    pub config: &'a ProxyConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub success: bool,
    pub message: &'static str,
    pub target: String,
    pub target_status: u16,
    pub target_response: Value,
    pub latency_ms: u128,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertInfo {
    pub success: bool,
    pub https_enabled: bool,
    pub https_port: u16,
    pub source: Option<&'static str>,
    pub certificate_path: Option<String>,
    pub certificate_count: Option<usize>,
}

/// GET /proxy-health: the proxy's own liveness. Never touches the upstream.
pub async fn proxy_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        success: true,
        status: "healthy",
        timestamp: epoch_millis(),
        target: state.config.target_display(),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Response {
    let report = StatusReport {
        success: true,
        state: state.lifecycle.current().as_str(),
        uptime: state.started_at.elapsed().as_secs_f64(),
        pid: std::process::id(),
        memory: process_memory(),
        requests: RequestCounts {
            in_flight: state.in_flight.active(),
            served: state.in_flight.served(),
        },
        https_active: state.tls.https_active(),
        platform: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        mode: state.config.mode.as_str(),
        version: env!("CARGO_PKG_VERSION"),
        target: state.config.target_display(),
        config: &state.config,
    };
    Json(report).into_response()
}

/// GET /test-connection: probe the upstream's own health path.
pub async fn test_connection(State(state): State<AppState>) -> Response {
    let target = state.probe.target().display().to_string();

    match state.probe.check().await {
        ProbeOutcome::Healthy {
            status,
            body,
            latency,
        } => Json(ConnectionReport {
            success: true,
            message: "Print server is reachable",
            target,
            target_status: status,
            target_response: body,
            latency_ms: latency.as_millis(),
        })
        .into_response(),
        ProbeOutcome::Unhealthy { status, .. } => {
            ApiError::UpstreamUnhealthy { target, status }.into_response()
        }
        ProbeOutcome::Failed(err) => ApiError::BadGateway {
            target,
            code: err.code(),
            details: err.to_string(),
            mode: state.config.mode,
        }
        .into_response(),
    }
}

/// GET /cert-info
pub async fn cert_info(State(state): State<AppState>) -> Json<CertInfo> {
    let credential = state.tls.credential();
    Json(CertInfo {
        success: true,
        https_enabled: state.tls.https_active(),
        https_port: state.tls.https_port().unwrap_or(state.config.https_port),
        source: credential.map(TlsCredential::source),
        certificate_path: credential.map(|c| c.certificate_path().display().to_string()),
        certificate_count: credential.and_then(|c| c.certificate_chain_der().ok()).map(|chain| chain.len()),
    })
}

/// GET /download-cert: the public certificate so clients can trust it.
///
/// PEM credentials are served as-is. For PKCS#12 only the leaf is served,
/// DER encoded; the bundle carries the private key.
pub async fn download_cert(State(state): State<AppState>) -> Response {
    let Some(credential) = state.tls.credential() else {
        return ApiError::NoCertificate.into_response();
    };

    let (body, content_type, filename) = match credential {
        TlsCredential::Pem { cert, .. } => (cert.clone(), "application/x-pem-file", "server.crt"),
        TlsCredential::Pkcs12 { .. } => match credential.certificate_chain_der() {
            Ok(mut chain) if !chain.is_empty() => (chain.swap_remove(0), "application/pkix-cert", "server.cer"),
            Ok(_) => return ApiError::NoCertificate.into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to extract certificate from bundle");
                return ApiError::Internal {
                    details: e.to_string(),
                    mode: state.config.mode,
                }
                .into_response();
            }
        },
    };

    let disposition = format!("attachment; filename=\"{}\"", filename);
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn process_memory() -> Option<MemoryUsage> {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    system.process(pid).map(|p| MemoryUsage {
        rss_bytes: p.memory(),
        virtual_bytes: p.virtual_memory(),
    })
}
