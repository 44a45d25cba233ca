//! Finalization: turn region windows and trees into the persisted report
//!
//! Runs once, after ingestion has ended. Region bounds are converted to
//! offsets from the workflow start; an unbounded start becomes offset 0
//! and an unbounded end becomes the workflow end. Every declared region
//! gets a record, with an empty tree if nothing completed inside it.
//!
//! Offsets and lengths saturate at the `i64` bounds rather than wrap.
//!
//! Output is keyed by region name only. When several units declared the
//! same name, the record spans all of their windows: the earliest start
//! and the latest end.

use crate::call_tree::RegionTrees;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::region::{DeclaredRegion, RegionRegistry};
use crate::report::{RegionRecord, RegionReport};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the report inside the host's output directory
pub const DEFAULT_OUTPUT_FILE: &str = "regions.json";

/// Absolute start and end offsets of one declared window
fn offsets(region: &DeclaredRegion, workflow_start: i64, workflow_end: i64) -> (i64, i64) {
    let start = region
        .window
        .start
        .map_or(0, |s| s.saturating_sub(workflow_start));
    let end = region
        .window
        .end
        .unwrap_or(workflow_end)
        .saturating_sub(workflow_start);
    (start, end)
}

/// Build the report from a registry snapshot and the ingested trees
pub fn build_report(
    regions: &[DeclaredRegion],
    mut trees: RegionTrees,
    workflow_start: i64,
    workflow_end: i64,
) -> RegionReport {
    let mut spans: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    for region in regions {
        let (start, end) = offsets(region, workflow_start, workflow_end);
        spans
            .entry(region.name.as_str())
            .and_modify(|span| {
                span.0 = span.0.min(start);
                span.1 = span.1.max(end);
            })
            .or_insert((start, end));
    }

    let mut report = RegionReport::new();
    for (name, (start, end)) in spans {
        let tree = trees.take(name).unwrap_or_default();
        debug!(region = name, start, end, nodes = tree.node_count(), "region finalized");
        report.insert(
            name,
            RegionRecord {
                length: end.saturating_sub(start),
                start,
                tree,
            },
        );
    }

    report
}

/// Serialize `report` and write it to `path`, replacing any existing file
pub fn write_report(report: &RegionReport, path: &Path) -> Result<()> {
    let mut json = report.to_json()?;
    json.push('\n');
    fs::write(path, json).map_err(|source| Error::Output {
        path: path.to_path_buf(),
        source,
    })
}

/// Query the host, build the report and write it to the output directory
///
/// All host queries are answered before the output file is touched, so a
/// failing query never leaves a partial artifact behind.
pub fn finalize<H: Host + ?Sized>(
    registry: &RegionRegistry,
    trees: RegionTrees,
    host: &H,
    output_file: &str,
) -> Result<(RegionReport, PathBuf)> {
    let workflow_start = host.workflow_start_time()?;
    let workflow_end = host.workflow_end_time()?;
    let path = host.output_dir()?.join(output_file);

    let report = build_report(&registry.snapshot(), trees, workflow_start, workflow_end);
    write_report(&report, &path)?;

    info!(path = %path.display(), regions = report.len(), "region report written");
    Ok((report, path))
}
