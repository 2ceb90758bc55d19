//! Upstream failure classification.

use std::error::Error as StdError;
use std::io;

use axum::response::Response;
use axum::response::IntoResponse;

use crate::config::Mode;
use crate::http::response::ApiError;
use crate::resilience::timeouts::Elapsed;

/// How far the client response has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseProgress {
    /// Nothing has been written yet; an error response can still be sent.
    NotStarted,
    /// Status and headers are out; the only option left is to drop the
    /// connection.
    HeadersSent,
}

impl ResponseProgress {
    pub fn is_writable(&self) -> bool {
        matches!(self, ResponseProgress::NotStarted)
    }
}

/// Why the upstream exchange failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("upstream timed out: {0}")]
    Timeout(String),
    #[error("DNS lookup failed: {0}")]
    Dns(String),
    #[error("connection reset: {0}")]
    Reset(String),
    #[error("invalid upstream URI: {0}")]
    InvalidUri(String),
    #[error("upstream error: {0}")]
    Other(String),
}

impl ProxyError {
    /// Machine readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::Refused(_) => "ECONNREFUSED",
            ProxyError::Timeout(_) => "ETIMEDOUT",
            ProxyError::Dns(_) => "ENOTFOUND",
            ProxyError::Reset(_) => "ECONNRESET",
            ProxyError::InvalidUri(_) => "EINVAL",
            ProxyError::Other(_) => "EPROXY",
        }
    }

    /// Classify any error by walking its source chain.
    pub fn classify(err: &(dyn StdError + 'static)) -> Self {
        let message = chain_message(err);

        let mut current: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = current {
            if e.downcast_ref::<Elapsed>().is_some() {
                return ProxyError::Timeout(message);
            }
            if let Some(io_err) = e.downcast_ref::<io::Error>() {
                match io_err.kind() {
                    io::ErrorKind::ConnectionRefused => return ProxyError::Refused(message),
                    io::ErrorKind::TimedOut => return ProxyError::Timeout(message),
                    io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof => return ProxyError::Reset(message),
                    _ => {}
                }
            }
            if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
                if hyper_err.is_incomplete_message() || hyper_err.is_canceled() {
                    return ProxyError::Reset(message);
                }
                if hyper_err.is_timeout() {
                    return ProxyError::Timeout(message);
                }
            }
            current = e.source();
        }

        let lower = message.to_ascii_lowercase();
        if lower.contains("dns error") || lower.contains("failed to lookup address") {
            ProxyError::Dns(message)
        } else {
            ProxyError::Other(message)
        }
    }

    /// Turn the error into a client response, unless the response has
    /// already started.
    pub fn into_response_if_writable(
        self,
        progress: ResponseProgress,
        target: &str,
        mode: Mode,
    ) -> Option<Response> {
        if !progress.is_writable() {
            return None;
        }
        let code = self.code();
        Some(
            ApiError::BadGateway {
                target: target.to_string(),
                code,
                details: self.to_string(),
                mode,
            }
            .into_response(),
        )
    }
}

impl From<Elapsed> for ProxyError {
    fn from(e: Elapsed) -> Self {
        ProxyError::Timeout(e.to_string())
    }
}

/// `outer: inner: innermost`, skipping repeats.
fn chain_message(err: &(dyn StdError + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        let text = e.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        current = e.source();
    }
    parts.join(": ")
}
