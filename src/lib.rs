//! Beacon - a small one-request-per-connection HTTP server.
//!
//! Core library: request parsing, routing, the per-connection session state
//! machine, the listener and the worker pool.

pub mod config;
pub mod error;
pub mod http;
pub mod router;
pub mod server;

pub use config::Config;
pub use error::ServerError;
