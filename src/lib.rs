//! CORS-aware reverse proxy for a single print server.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod monitoring;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod resilience;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::{RunningProxy, Shutdown};
