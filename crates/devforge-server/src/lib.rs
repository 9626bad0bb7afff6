//! Runtime binary support: config loading, the stdio protocol, HTTP
//! health/metrics endpoints, the WebSocket fabric, and the health monitor
//! ticker that ties C1-C6 together into a single process (spec §6).
//!
//! The binary entry point lives in `main.rs`; this library exposes the
//! pieces so integration tests can assemble a server without going through
//! a real process.

pub mod config;
pub mod error;
pub mod health;
pub mod health_monitor;
pub mod metrics_prom;
pub mod protocol;
pub mod ws;

pub use config::ServerConfig;
pub use error::ServerError;
