//! Configuration loading from the process environment.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::config::schema::{Mode, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Parse {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from the process environment.
pub fn from_env() -> Result<ProxyConfig, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Load and validate configuration from an arbitrary variable lookup.
pub fn from_lookup<F>(lookup: F) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let mut config = ProxyConfig::default();

    if let Some(host) = get("PROXY_HOST") {
        config.bind_host = host;
    }
    if let Some((var, raw)) = first_of(&get, &["HTTP_PORT", "PROXY_PORT"]) {
        config.http_port = parse_num(var, &raw)?;
    }
    if let Some(raw) = get("HTTPS_PORT") {
        config.https_port = parse_num("HTTPS_PORT", &raw)?;
    }

    config.target_url = match get("PRINT_SERVER_URL") {
        Some(raw) => parse_url("PRINT_SERVER_URL", &raw)?,
        None => {
            let host = get("PRINT_SERVER_HOST").unwrap_or_else(|| "localhost".to_string());
            let port: u16 = match get("PRINT_SERVER_PORT") {
                Some(raw) => parse_num("PRINT_SERVER_PORT", &raw)?,
                None => 3000,
            };
            parse_url("PRINT_SERVER_HOST", &format!("http://{}:{}", host, port))?
        }
    };

    if let Some(raw) = get("ALLOWED_ORIGINS") {
        config.allowed_origins = parse_origins(&raw);
    }

    if let Some(raw) = get("RATE_LIMIT_WINDOW_MS") {
        config.rate_limit.window = Duration::from_millis(parse_num("RATE_LIMIT_WINDOW_MS", &raw)?);
    }
    if let Some(raw) = get("RATE_LIMIT_MAX") {
        config.rate_limit.max_requests = parse_num("RATE_LIMIT_MAX", &raw)?;
    }

    config.tls.passphrase = lookup("SSL_CERT_PASS").filter(|v| !v.is_empty());
    if let Some(raw) = get("SSL_ENABLED") {
        config.tls.enabled = parse_bool("SSL_ENABLED", &raw)?;
    }
    config.tls.extra_dir = get("SSL_CERT_DIR").map(PathBuf::from);

    if let Some(raw) = get("NODE_ENV") {
        config.mode = if raw.eq_ignore_ascii_case("production") {
            Mode::Production
        } else {
            Mode::Development
        };
    }

    if let Some(raw) = get("METRICS_ADDRESS") {
        config.metrics_address = Some(raw.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Parse {
                var: "METRICS_ADDRESS",
                value: raw.clone(),
                reason: e.to_string(),
            }
        })?);
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn first_of<G>(get: &G, keys: &[&'static str]) -> Option<(&'static str, String)>
where
    G: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|k| get(k).map(|v| (*k, v)))
}

fn parse_num<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Parse {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Parse {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Parse {
            var,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

/// Split a comma-separated origin list, keeping first-seen order.
pub fn parse_origins(raw: &str) -> Vec<String> {
    let mut origins: Vec<String> = Vec::new();
    for origin in raw.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        let origin = origin.trim_end_matches('/').to_string();
        if !origins.contains(&origin) {
            origins.push(origin);
        }
    }
    origins
}
