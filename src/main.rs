//! Print proxy daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                   PRINT PROXY                     │
//!                         │                                                   │
//!   Browser / client      │  ┌──────────┐   ┌──────┐   ┌────────────┐         │
//!   ──────────────────────┼─▶│ listener │──▶│ CORS │──▶│ rate limit │         │
//!   (HTTP and HTTPS)      │  │ http/tls │   └──────┘   └─────┬──────┘         │
//!                         │  └──────────┘                     │                │
//!                         │                                   ▼                │
//!                         │              ┌────────────┐  ┌──────────┐          │
//!                         │              │ monitoring │◀─│ dispatch │          │
//!                         │              │  handlers  │  └────┬─────┘          │
//!                         │              └────────────┘       │                │
//!                         │                                   ▼                │
//!   ◀─────────────────────┼───────────────────────────── ┌───────────┐         │
//!                         │                              │ forwarder │─────────┼──▶ Print server
//!                         │                              └───────────┘         │
//!                         │                                                   │
//!                         │  config · tls resolver · lifecycle · observability │
//!                         └──────────────────────────────────────────────────┘
//! ```
//!
//! Exit status is 0 after a clean drain and 1 on a configuration error, an
//! HTTP bind failure, a crashed listener or sweeper, or a drain that overran its deadline.

use std::process::ExitCode;

use print_proxy::config::loader;
use print_proxy::lifecycle::{self, signals};
use print_proxy::net::OsFs;
use print_proxy::observability::{logging, metrics};
use print_proxy::resilience::timeouts::SHUTDOWN_GRACE;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init(logging::LogFormat::from_env());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "print-proxy starting");

    let config = match loader::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        bind_host = %config.bind_host,
        http_port = config.http_port,
        https_port = config.https_port,
        upstream = %config.target_display(),
        mode = %config.mode,
        rate_limit_max = config.rate_limit.max_requests,
        rate_limit_window_ms = config.rate_limit.window.as_millis() as u64,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_address {
        metrics::init_metrics(addr);
    }

    let mut proxy = match lifecycle::start(config, &OsFs).await {
        Ok(proxy) => proxy,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let failed = tokio::select! {
        _ = signals::termination() => false,
        err = proxy.wait_for_failure() => {
            tracing::error!(error = %err, "Background task failure; shutting down");
            true
        }
    };

    match proxy.shutdown(SHUTDOWN_GRACE).await {
        Ok(()) if !failed => ExitCode::SUCCESS,
        Ok(()) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "Shutdown did not complete cleanly");
            ExitCode::FAILURE
        }
    }
}
