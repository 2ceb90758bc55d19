//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup
//!     → tls.rs (probe disk for credentials, once)
//!     → listener.rs (bind HTTP always, HTTPS iff credentials resolved)
//!
//! Per request
//!     → connection.rs (in-flight tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS discovery never fails the process; no credential means HTTP only
//! - Binding happens before serving so bind errors are seen synchronously

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{InFlightGuard, InFlightTracker};
pub use listener::{BoundListener, ListenerError};
pub use tls::{CertProbe, CertSource, OsFs, TlsCredential, TlsResolver, TlsStatus};
