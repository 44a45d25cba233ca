//! Fatal errors surfaced to the caller
//!
//! Per-line protocol problems are not errors at this level: the ingestor
//! logs and discards them (see [`crate::event::LineError`]).

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a session stage
#[derive(Error, Debug)]
pub enum Error {
    #[error("Event channel failed: {0}")]
    Channel(String),

    #[error("Host query \"{query}\" failed: {reason}")]
    HostQuery { query: &'static str, reason: String },

    #[error("Could not write output to {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not serialize region report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Configuration handshake failed: {0}")]
    Handshake(String),

    #[error("Invalid reply to \"{request}\" received: {reply}")]
    InvalidApiMode { request: &'static str, reply: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(#[from] crate::timestamp::ParseTimestampError),

    #[error("Region \"{name}\" was never declared for unit {unit}")]
    UndeclaredRegion { unit: String, name: String },

    #[error("Ingestion thread panicked")]
    IngestPanicked,
}

impl Error {
    /// Build a host query failure from any displayable reason
    pub fn host_query(query: &'static str, reason: impl std::fmt::Display) -> Self {
        Error::HostQuery {
            query,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
