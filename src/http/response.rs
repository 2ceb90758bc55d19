//! Structured JSON responses.
//!
//! Every error leaving the proxy has the shape
//! `{success: false, error, message, details?}`. `details` carries debug
//! information and is dropped in production mode.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::config::Mode;

/// Error responses produced by the proxy itself.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// No monitoring route and not a forwardable request.
    NotFound { method: String, path: String },
    /// Client exceeded the rate limit.
    RateLimited { retry_after_secs: u64 },
    /// Upstream could not be reached.
    BadGateway {
        target: String,
        code: &'static str,
        details: String,
        mode: Mode,
    },
    /// Upstream answered a probe with a non-success status.
    UpstreamUnhealthy { target: String, status: u16 },
    /// Unexpected failure inside the pipeline.
    Internal { details: String, mode: Mode },
    /// HTTPS is not configured.
    NoCertificate,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(rename = "targetStatus", skip_serializing_if = "Option::is_none")]
    target_status: Option<u16>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } | ApiError::NoCertificate => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway { .. } | ApiError::UpstreamUnhealthy { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody<'_> {
        let base = |error, message: String| ErrorBody {
            success: false,
            error,
            message,
            details: None,
            target: None,
            code: None,
            target_status: None,
        };

        match self {
            ApiError::NotFound { method, path } => base(
                "Not Found",
                format!("Route {} {} not found", method, path),
            ),
            ApiError::RateLimited { .. } => base(
                "Too many requests",
                "Too many requests from this IP, please try again later.".to_string(),
            ),
            ApiError::BadGateway {
                target,
                code,
                details,
                mode,
            } => ErrorBody {
                details: (!mode.is_production()).then_some(details.as_str()),
                target: Some(target),
                code: Some(code),
                ..base(
                    "Bad Gateway",
                    format!("Failed to connect to print server at {}", target),
                )
            },
            ApiError::UpstreamUnhealthy { target, status } => ErrorBody {
                target: Some(target),
                code: Some("EUPSTREAM"),
                target_status: Some(*status),
                ..base(
                    "Bad Gateway",
                    format!("Print server at {} answered with status {}", target, status),
                )
            },
            ApiError::Internal { details, mode } => ErrorBody {
                details: (!mode.is_production()).then_some(details.as_str()),
                ..base("Internal Server Error", "An unexpected error occurred".to_string())
            },
            ApiError::NoCertificate => base(
                "Not Found",
                "HTTPS is not enabled; no certificate is available".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
