//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, layer stack)
//!     → request.rs (request ID, request context, in-flight tracking)
//!     → middleware/cors.rs (preflight, CORS decision)
//!     → monitoring handler or proxy forwarder
//!     → response.rs (structured error bodies)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestContext, Transport, X_REQUEST_ID};
pub use response::ApiError;
pub use server::{AppState, HttpServer};
