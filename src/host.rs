//! Queries answered by the host runtime
//!
//! The host owns the workflow clock, knows whether the producer is still
//! alive and decides where output goes. Any query may fail; callers treat
//! a failure as fatal for the stage that asked.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host-side queries used by ingestion and finalization
pub trait Host {
    fn workflow_start_time(&self) -> Result<i64>;

    fn workflow_end_time(&self) -> Result<i64>;

    /// Whether the producer may still emit events
    fn is_producer_running(&self) -> Result<bool>;

    /// Directory the report is written into
    fn output_dir(&self) -> Result<PathBuf>;
}

impl<H: Host + ?Sized> Host for &H {
    fn workflow_start_time(&self) -> Result<i64> {
        (**self).workflow_start_time()
    }

    fn workflow_end_time(&self) -> Result<i64> {
        (**self).workflow_end_time()
    }

    fn is_producer_running(&self) -> Result<bool> {
        (**self).is_producer_running()
    }

    fn output_dir(&self) -> Result<PathBuf> {
        (**self).output_dir()
    }
}

impl<H: Host + ?Sized> Host for Arc<H> {
    fn workflow_start_time(&self) -> Result<i64> {
        (**self).workflow_start_time()
    }

    fn workflow_end_time(&self) -> Result<i64> {
        (**self).workflow_end_time()
    }

    fn is_producer_running(&self) -> Result<bool> {
        (**self).is_producer_running()
    }

    fn output_dir(&self) -> Result<PathBuf> {
        (**self).output_dir()
    }
}

/// Host backed by fixed values, used by the command-line front-end
///
/// A missing workflow end or output directory makes the matching query
/// fail, the same way an unavailable host answer would.
#[derive(Debug, Clone)]
pub struct StaticHost {
    workflow_start: i64,
    workflow_end: Option<i64>,
    output_dir: Option<PathBuf>,
    producer_running: Arc<AtomicBool>,
}

impl StaticHost {
    pub fn new(workflow_start: i64) -> Self {
        Self {
            workflow_start,
            workflow_end: None,
            output_dir: None,
            producer_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_workflow_end(mut self, end: i64) -> Self {
        self.workflow_end = Some(end);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Track producer liveness through a shared flag
    pub fn with_producer_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.producer_running = running;
        self
    }
}

impl Host for StaticHost {
    fn workflow_start_time(&self) -> Result<i64> {
        Ok(self.workflow_start)
    }

    fn workflow_end_time(&self) -> Result<i64> {
        self.workflow_end
            .ok_or_else(|| Error::host_query("workflow end time", "not available"))
    }

    fn is_producer_running(&self) -> Result<bool> {
        Ok(self.producer_running.load(Ordering::Acquire))
    }

    fn output_dir(&self) -> Result<PathBuf> {
        self.output_dir
            .clone()
            .ok_or_else(|| Error::host_query("module output directory", "not configured"))
    }
}
