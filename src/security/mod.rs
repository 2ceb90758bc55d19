//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after CORS):
//!     → rate_limit.rs (check per-IP window, monitoring paths exempt)
//!     → routing / forwarder
//!         → headers.rs (strip hop-by-hop, add X-Forwarded-*, rewrite Host)
//! ```
//!
//! # Design Decisions
//! - Counters are process-local; single-instance deployment
//! - Monitoring routes bypass limits so operators can always see state
//! - No trust in client-supplied hop-by-hop headers

pub mod headers;
pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateDecision, RateLimiter};
