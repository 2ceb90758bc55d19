//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (connect + response deadline)
//!     → On failure: 502 to the client, no retry
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - There is a single upstream, so retries and circuit breaking are left out

pub mod timeouts;
