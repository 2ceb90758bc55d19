//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! The configuration is built once at startup and shared read-only (via
//! `Arc`) by every subsystem.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use url::Url;

/// Default PKCS#12 passphrase used when `SSL_CERT_PASS` is not set.
pub const DEFAULT_CERT_PASSPHRASE: &str = "printproxy";

/// Root configuration for the print proxy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Interface both listeners bind to.
    pub bind_host: String,

    /// Plain HTTP port (always bound).
    pub http_port: u16,

    /// HTTPS port (bound only when TLS material resolves).
    pub https_port: u16,

    /// Base URL of the upstream print server.
    #[serde(serialize_with = "serialize_url")]
    pub target_url: Url,

    /// Ordered allowed origins; `*` allows any origin.
    pub allowed_origins: Vec<String>,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// TLS discovery settings.
    pub tls: TlsSettings,

    /// Runtime mode (controls error detail exposure).
    pub mode: Mode,

    /// Optional Prometheus scrape address.
    pub metrics_address: Option<SocketAddr>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            http_port: 8080,
            https_port: 8443,
            target_url: default_target(),
            allowed_origins: vec!["*".to_string()],
            rate_limit: RateLimitConfig::default(),
            tls: TlsSettings::default(),
            mode: Mode::Development,
            metrics_address: None,
        }
    }
}

impl ProxyConfig {
    /// `host:port` for the HTTP listener.
    pub fn http_bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.http_port)
    }

    /// `host:port` for the HTTPS listener.
    pub fn https_bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.https_port)
    }

    /// Target URL rendered without a trailing slash, as reported to clients.
    pub fn target_display(&self) -> String {
        self.target_url.as_str().trim_end_matches('/').to_string()
    }

    /// True when `*` is among the allowed origins.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

fn default_target() -> Url {
    Url::parse("http://localhost:3000").expect("static default target URL is valid")
}

fn serialize_url<S: serde::Serializer>(url: &Url, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(url.as_str().trim_end_matches('/'))
}

/// Fixed-window rate limiting configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Window length.
    #[serde(serialize_with = "serialize_millis")]
    pub window: Duration,

    /// Maximum requests per client IP within one window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(15 * 60 * 1000),
            max_requests: 1000,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// TLS discovery settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSettings {
    /// `false` disables HTTPS regardless of what is on disk.
    pub enabled: bool,

    /// PKCS#12 passphrase. Never serialized.
    #[serde(skip)]
    pub passphrase: Option<String>,

    /// Extra directory probed before the conventional locations.
    pub extra_dir: Option<PathBuf>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            passphrase: None,
            extra_dir: None,
        }
    }
}

impl TlsSettings {
    /// Passphrase to unlock a PKCS#12 bundle.
    pub fn passphrase_or_default(&self) -> &str {
        self.passphrase.as_deref().unwrap_or(DEFAULT_CERT_PASSPHRASE)
    }
}

/// Runtime mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_any_origin() {
        let config = ProxyConfig::default();
        assert!(config.allows_any_origin());
        assert_eq!(config.http_bind_address(), "0.0.0.0:8080");
        assert_eq!(config.target_display(), "http://localhost:3000");
    }

    #[test]
    fn passphrase_is_never_serialized() {
        let mut config = ProxyConfig::default();
        config.tls.passphrase = Some("hunter2".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"window\":900000"));
    }
}
