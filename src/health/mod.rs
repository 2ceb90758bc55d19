//! Upstream health subsystem.
//!
//! # Data Flow
//! ```text
//! GET /test-connection
//!     → probe.rs (GET {target}/health with a deadline)
//!     → ProbeOutcome (healthy / unhealthy / failed)
//!     → monitoring handler maps to 200 or 502
//! ```
//!
//! # Design Decisions
//! - Probes run on demand only; the proxy's own liveness never depends on them
//! - Non-2xx answers are failures, 4xx included

pub mod probe;

pub use probe::{ProbeOutcome, UpstreamProbe, UPSTREAM_HEALTH_PATH};
