//! Process-wide error type (see SPEC_FULL.md §10.2).
//!
//! Request-level faults (malformed JSON, unknown framerate, ...) are a
//! separate, smaller type — [`crate::protocol::ProtocolError`]. This type
//! covers faults fatal to a task or to the whole process: bind failures,
//! I/O, and task join failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task panicked or was cancelled: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
