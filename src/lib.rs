//! regionprof - per-region call trees from enter/exit trace events
//!
//! This library consumes a stream of timestamped enter/exit events emitted
//! by an instrumented API, attributes each event to the time-bounded
//! regions declared for its execution unit, and accumulates one
//! inclusive-time call tree per region. Once the stream ends, region
//! windows are converted to workflow-relative offsets and the trees are
//! written out as a single JSON report.
//!
//! The [`session::Session`] type ties the pieces together.

pub mod call_stack;
pub mod call_tree;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod finalize;
pub mod handshake;
pub mod host;
pub mod ingest;
pub mod region;
pub mod report;
pub mod session;
pub mod source;
pub mod timestamp;
