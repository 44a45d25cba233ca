//! Session configuration and TOML session files
//!
//! A session file bundles everything a standalone run needs that a host
//! runtime would otherwise supply:
//!
//! ```toml
//! [session]
//! stack_scope = "shared"     # or "per_unit"
//! poll_timeout_ms = 100
//! output_file = "regions.json"
//! api_mode = "runtime"       # reply to the start-up handshake
//!
//! [workflow]
//! start = 100
//! end = 500
//!
//! [[region]]
//! unit = "1234_1234"
//! name = "solver"
//! start = 120                # omit for an unbounded start
//! end = 480                  # omit to leave the region open
//! ```

use crate::call_stack::StackScope;
use crate::finalize::DEFAULT_OUTPUT_FILE;
use crate::handshake::ApiMode;
use crate::ingest::DEFAULT_POLL_TIMEOUT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Settings for one monitoring session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether units sharing a region also share its call stack
    pub stack_scope: StackScope,

    /// How long ingestion waits for a line before checking the producer
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Report file name inside the output directory
    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Reply given to the API mode request, if answered locally
    pub api_mode: Option<ApiMode>,
}

fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT.as_millis() as u64
}

fn default_output_file() -> String {
    DEFAULT_OUTPUT_FILE.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stack_scope: StackScope::default(),
            poll_timeout_ms: default_poll_timeout_ms(),
            output_file: default_output_file(),
            api_mode: None,
        }
    }
}

impl SessionConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Workflow clock bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowBounds {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// A region declared up front in a session file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDeclaration {
    pub unit: String,
    pub name: String,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// Parsed session file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFile {
    pub session: SessionConfig,
    pub workflow: WorkflowBounds,
    #[serde(rename = "region")]
    pub regions: Vec<RegionDeclaration>,
}

impl SessionFile {
    /// Load a session file from disk
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read session file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid session file: {}", path.as_ref().display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: SessionFile =
            toml::from_str(content).context("Failed to parse TOML session definition")?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        if self.session.poll_timeout_ms == 0 {
            anyhow::bail!("poll_timeout_ms must be greater than 0");
        }
        if self.session.output_file.trim().is_empty() {
            anyhow::bail!("output_file must not be empty");
        }
        for region in &self.regions {
            if region.unit.split_whitespace().count() != 1 {
                anyhow::bail!(
                    "Region '{}' has unit id '{}', which must be a single whitespace-free token",
                    region.name,
                    region.unit
                );
            }
            if let (Some(start), Some(end)) = (region.start, region.end) {
                if end < start {
                    anyhow::bail!(
                        "Region '{}' for unit {} ends ({}) before it starts ({})",
                        region.name,
                        region.unit,
                        end,
                        start
                    );
                }
            }
        }
        Ok(())
    }
}
