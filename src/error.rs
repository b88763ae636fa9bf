//! Error types shared by the listener, sessions and startup code.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use crate::http::parser::ParseError;

/// Everything that can go wrong while starting or running the server.
///
/// Only the startup variants (`Bind`, `Config`, `InvalidWorkerCount`,
/// `Runtime`) are fatal. The rest are contained to the session or accept
/// attempt that produced them.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to read request: {0}")]
    Read(#[source] io::Error),

    #[error("malformed request: {0:?}")]
    Parse(ParseError),

    #[error("request exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("{phase} timed out after {after:?}")]
    Timeout { phase: &'static str, after: Duration },

    #[error("failed to write response: {0}")]
    Write(#[source] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker pool needs at least one thread")]
    InvalidWorkerCount,

    #[error("failed to start worker pool: {0}")]
    Runtime(#[source] io::Error),
}

impl From<ParseError> for ServerError {
    fn from(err: ParseError) -> Self {
        ServerError::Parse(err)
    }
}
