//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve TLS → Bind HTTP (fatal) → Bind HTTPS (optional) → running
//!
//! Shutdown (shutdown.rs):
//!     Signal received → draining → stop accepting → drain (10s) → stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - State transitions are checked (state.rs); skipping a state is an error
//! - Shutdown has a deadline: listeners still open after it are force-closed
//!   and the process reports failure

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use shutdown::Shutdown;
pub use startup::{start, start_with, RunningProxy};
pub use state::{Lifecycle, LifecycleError, LifecycleState};
