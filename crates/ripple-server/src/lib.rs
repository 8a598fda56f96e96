//! # Ripple Server
//!
//! HTTP front end for the ripple engine: renders pages into new sessions,
//! upgrades their WebSocket connections, and exports metrics.

pub mod config;
pub mod demo;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app, run_server, serve, AppState};
