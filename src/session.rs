//! Session context: the one object every entry point goes through
//!
//! A [`Session`] owns the configuration and the shared region registry.
//! Hosts keep a [`RegionHandle`] per thread to declare regions while a
//! dedicated ingestion thread drains the event channel. When ingestion
//! ends, the session finalizes the trees into the report.
//!
//! ```no_run
//! use regionprof::config::SessionConfig;
//! use regionprof::handshake::FixedReply;
//! use regionprof::host::StaticHost;
//! use regionprof::session::Session;
//! use regionprof::source::{event_channel, ProducerMessage};
//!
//! # fn main() -> regionprof::error::Result<()> {
//! let mut session = Session::new(SessionConfig::default());
//! session.handshake(&mut FixedReply::new("runtime"))?;
//!
//! let host = StaticHost::new(100).with_workflow_end(500).with_output_dir("/tmp");
//! let regions = session.region_handle();
//! regions.begin("R", "P1", "100")?;
//!
//! let (tx, source) = event_channel();
//! tx.send(ProducerMessage::Line("100 P1 enter f".into())).ok();
//! tx.send(ProducerMessage::Line("150 P1 exit f".into())).ok();
//! drop(tx);
//! let ingestion = session.spawn_ingestion(source, host.clone())?;
//!
//! let outcome = ingestion.join()?;
//! let (_report, path) = session.finalize(outcome, &host)?;
//! println!("report written to {}", path.display());
//! # Ok(())
//! # }
//! ```

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::finalize;
use crate::handshake::{self, ApiMode, HandshakeChannel};
use crate::host::Host;
use crate::ingest::{EventIngestor, IngestOutcome};
use crate::region::RegionRegistry;
use crate::report::RegionReport;
use crate::source::EventSource;
use crate::timestamp::Timestamp;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::info;

/// Cloneable handle for declaring regions from any thread
///
/// Timestamps arrive as host strings: a signed integer or `unknown`.
#[derive(Debug, Clone)]
pub struct RegionHandle {
    registry: Arc<RegionRegistry>,
}

impl RegionHandle {
    pub fn begin(&self, name: &str, unit: &str, timestamp: &str) -> Result<()> {
        let ts: Timestamp = timestamp.parse()?;
        self.registry.begin(name, unit, ts);
        Ok(())
    }

    pub fn end(&self, name: &str, unit: &str, timestamp: &str) -> Result<()> {
        let ts: Timestamp = timestamp.parse()?;
        self.registry.end(name, unit, ts)
    }
}

/// Ingestion running on its own thread
#[derive(Debug)]
pub struct IngestionHandle {
    handle: JoinHandle<Result<IngestOutcome>>,
}

impl IngestionHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for ingestion to end and collect what it built
    pub fn join(self) -> Result<IngestOutcome> {
        self.handle.join().map_err(|_| Error::IngestPanicked)?
    }
}

/// One monitoring session
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    registry: Arc<RegionRegistry>,
    api_mode: Option<ApiMode>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            registry: Arc::new(RegionRegistry::new()),
            api_mode: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RegionRegistry> {
        &self.registry
    }

    pub fn region_handle(&self) -> RegionHandle {
        RegionHandle {
            registry: Arc::clone(&self.registry),
        }
    }

    /// API mode agreed during the handshake, if it has run
    pub fn api_mode(&self) -> Option<ApiMode> {
        self.api_mode
    }

    /// Run the start-up handshake; an invalid reply is fatal
    pub fn handshake<C: HandshakeChannel + ?Sized>(&mut self, channel: &mut C) -> Result<ApiMode> {
        let mode = handshake::request_api_mode(channel)?;
        self.api_mode = Some(mode);
        Ok(mode)
    }

    pub fn begin_region(&self, name: &str, unit: &str, timestamp: &str) -> Result<()> {
        self.region_handle().begin(name, unit, timestamp)
    }

    pub fn end_region(&self, name: &str, unit: &str, timestamp: &str) -> Result<()> {
        self.region_handle().end(name, unit, timestamp)
    }

    /// A fresh ingestor configured for this session
    pub fn ingestor(&self) -> EventIngestor {
        EventIngestor::new(Arc::clone(&self.registry), self.config.stack_scope)
            .with_poll_timeout(self.config.poll_timeout())
    }

    /// Run ingestion on the calling thread
    pub fn ingest<S, H>(&self, source: &mut S, host: &H) -> Result<IngestOutcome>
    where
        S: EventSource + ?Sized,
        H: Host + ?Sized,
    {
        let mut ingestor = self.ingestor();
        ingestor.run(source, host)?;
        Ok(ingestor.finish())
    }

    /// Run ingestion on a dedicated thread
    pub fn spawn_ingestion<S, H>(&self, mut source: S, host: H) -> Result<IngestionHandle>
    where
        S: EventSource + Send + 'static,
        H: Host + Send + 'static,
    {
        let mut ingestor = self.ingestor();
        let handle = thread::Builder::new()
            .name("region-ingest".to_string())
            .spawn(move || {
                ingestor.run(&mut source, &host)?;
                Ok(ingestor.finish())
            })
            .map_err(|e| Error::Channel(format!("could not spawn ingestion thread: {}", e)))?;

        Ok(IngestionHandle { handle })
    }

    /// Write the report for everything ingested
    pub fn finalize<H: Host + ?Sized>(
        &self,
        outcome: IngestOutcome,
        host: &H,
    ) -> Result<(RegionReport, PathBuf)> {
        info!(
            calls = outcome.stats.calls_completed,
            unclosed = outcome.unclosed.len(),
            "finalizing session"
        );
        finalize::finalize(&self.registry, outcome.trees, host, &self.config.output_file)
    }
}
