//! Request middleware that runs ahead of routing.

pub mod cors;

pub use cors::{cors_middleware, CorsDecision, CorsPolicy};
