//! Event ingestion: parse, match against regions, fold into trees
//!
//! The ingestor runs on a single thread and owns the call stacks and the
//! trees outright. The only shared state it touches is the region
//! registry, locked once per event for the lookup and released before any
//! stack or tree work happens.
//!
//! Per-line problems (malformed lines, unknown timestamps, units with no
//! regions, unmatched exits, overflowing durations) are logged with the offending input, counted
//! in [`IngestStats`] and otherwise ignored.

use crate::call_stack::{CallStackTracker, StackMismatch, StackScope, UnclosedStack};
use crate::call_tree::RegionTrees;
use crate::error::Result;
use crate::event::{LineError, TraceEvent};
use crate::host::Host;
use crate::region::RegionRegistry;
use crate::source::{EventSource, Polled};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default wait for the next line before asking whether the producer lives
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Counters for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines taken off the channel
    pub lines_received: u64,
    /// (event, region) pairs handed to the call stacks
    pub events_dispatched: u64,
    /// Exits matched and folded into a tree, counted per region
    pub calls_completed: u64,
    pub malformed_lines: u64,
    pub unknown_timestamps: u64,
    /// Events from units that had no regions declared at all
    pub undeclared_units: u64,
    pub stack_mismatches: u64,
    /// Exits too far from their enter for the duration to fit an `i64`
    pub duration_overflows: u64,
    pub timeouts: u64,
}

impl IngestStats {
    /// Lines or dispatches that were discarded for any reason
    pub fn discarded(&self) -> u64 {
        self.malformed_lines
            + self.unknown_timestamps
            + self.undeclared_units
            + self.stack_mismatches
            + self.duration_overflows
    }
}

/// Everything ingestion produced, handed to finalization
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub trees: RegionTrees,
    pub stats: IngestStats,
    /// Calls that never saw their exit
    pub unclosed: Vec<UnclosedStack>,
}

/// Drains an event source into per-region call trees
#[derive(Debug)]
pub struct EventIngestor {
    registry: Arc<RegionRegistry>,
    stacks: CallStackTracker,
    trees: RegionTrees,
    stats: IngestStats,
    poll_timeout: Duration,
}

impl EventIngestor {
    pub fn new(registry: Arc<RegionRegistry>, scope: StackScope) -> Self {
        Self {
            registry,
            stacks: CallStackTracker::new(scope),
            trees: RegionTrees::new(),
            stats: IngestStats::default(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn trees(&self) -> &RegionTrees {
        &self.trees
    }

    /// Drain `source` until the stream closes or the producer is gone
    ///
    /// On a poll timeout the host is asked whether the producer still
    /// runs; if not, whatever is already queued is drained and ingestion
    /// ends. Channel and host failures abort with an error.
    pub fn run<S, H>(&mut self, source: &mut S, host: &H) -> Result<()>
    where
        S: EventSource + ?Sized,
        H: Host + ?Sized,
    {
        info!(scope = ?self.stacks.scope(), timeout_ms = self.poll_timeout.as_millis() as u64, "ingestion started");

        loop {
            match source.poll(self.poll_timeout)? {
                Polled::Line(line) => self.ingest_line(&line),
                Polled::Closed => {
                    debug!("event stream closed by producer");
                    break;
                }
                Polled::Timeout => {
                    self.stats.timeouts += 1;
                    if !host.is_producer_running()? {
                        debug!("producer no longer running, draining queued events");
                        self.drain(source)?;
                        break;
                    }
                }
            }
        }

        info!(
            lines = self.stats.lines_received,
            calls = self.stats.calls_completed,
            discarded = self.stats.discarded(),
            "ingestion finished"
        );
        Ok(())
    }

    fn drain<S: EventSource + ?Sized>(&mut self, source: &mut S) -> Result<()> {
        while let Polled::Line(line) = source.poll(Duration::ZERO)? {
            self.ingest_line(&line);
        }
        Ok(())
    }

    /// Parse and route one raw protocol line
    pub fn ingest_line(&mut self, line: &str) {
        self.stats.lines_received += 1;

        match TraceEvent::parse(line) {
            Ok(event) => self.route(&event, line),
            Err(LineError::UnknownTimestamp) => {
                self.stats.unknown_timestamps += 1;
                warn!(line, "dropping event with unknown timestamp");
            }
            Err(e) => {
                self.stats.malformed_lines += 1;
                warn!(line, error = %e, "discarding malformed event line");
            }
        }
    }

    /// Route an already-parsed event
    pub fn ingest_event(&mut self, event: &TraceEvent) {
        let raw = event.to_string();
        self.route(event, &raw);
    }

    fn route(&mut self, event: &TraceEvent, raw: &str) {
        let Some(regions) = self.registry.lookup(&event.unit, event.timestamp) else {
            self.stats.undeclared_units += 1;
            warn!(line = raw, unit = %event.unit, "no regions declared for unit, discarding event");
            return;
        };

        if regions.is_empty() {
            trace!(line = raw, "event outside every region of its unit");
            return;
        }

        for region in &regions {
            self.stats.events_dispatched += 1;
            match self.stacks.apply(region, event) {
                Ok(Some(call)) => {
                    trace!(region = %region, depth = call.path.len(), duration = call.duration, "call completed");
                    self.trees.record(region, &call.path, call.duration);
                    self.stats.calls_completed += 1;
                }
                Ok(None) => {}
                Err(overflow @ StackMismatch::DurationOverflow { .. }) => {
                    self.stats.duration_overflows += 1;
                    warn!(line = raw, region = %region, error = %overflow, "discarding exit with unrepresentable duration");
                }
                Err(mismatch) => {
                    self.stats.stack_mismatches += 1;
                    warn!(line = raw, region = %region, error = %mismatch, "discarding unmatched exit");
                }
            }
        }
    }

    /// Consume the ingestor, reporting calls that never exited
    pub fn finish(self) -> IngestOutcome {
        let unclosed = self.stacks.unclosed();
        for stack in &unclosed {
            warn!(
                region = %stack.region,
                unit = stack.unit.as_deref().unwrap_or("*"),
                frames = stack.frames.len(),
                innermost = %stack.frames.last().map_or("", |f| f.label.as_str()),
                "calls still in flight when ingestion ended, not counted"
            );
        }

        IngestOutcome {
            trees: self.trees,
            stats: self.stats,
            unclosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::host::StaticHost;
    use crate::timestamp::Timestamp;
    use std::collections::VecDeque;

    /// Source that replays a fixed script of poll results
    struct ScriptedSource {
        script: VecDeque<Result<Polled>>,
        polls: usize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Polled>>) -> Self {
            Self {
                script: script.into(),
                polls: 0,
            }
        }

        fn lines(lines: &[&str]) -> Self {
            let mut script: Vec<Result<Polled>> = lines
                .iter()
                .map(|l| Ok(Polled::Line(l.to_string())))
                .collect();
            script.push(Ok(Polled::Closed));
            Self::new(script)
        }
    }

    impl EventSource for ScriptedSource {
        fn poll(&mut self, _timeout: Duration) -> Result<Polled> {
            self.polls += 1;
            self.script.pop_front().unwrap_or(Ok(Polled::Timeout))
        }
    }

    fn registry_with(regions: &[(&str, &str, Option<i64>, Option<i64>)]) -> Arc<RegionRegistry> {
        let registry = Arc::new(RegionRegistry::new());
        for (name, unit, start, end) in regions {
            registry.begin(name, unit, Timestamp::from(*start));
            registry.end(name, unit, Timestamp::from(*end)).unwrap();
        }
        registry
    }

    fn run_lines(registry: Arc<RegionRegistry>, lines: &[&str]) -> IngestOutcome {
        let mut ingestor = EventIngestor::new(registry, StackScope::Shared);
        let mut source = ScriptedSource::lines(lines);
        ingestor.run(&mut source, &StaticHost::new(0)).unwrap();
        ingestor.finish()
    }

    #[test]
    fn test_single_call_in_unbounded_region() {
        let registry = registry_with(&[("R", "P1", None, None)]);
        let outcome = run_lines(registry, &["100 P1 enter f", "150 P1 exit f"]);

        let tree = outcome.trees.get("R").unwrap();
        assert_eq!(tree.root("f").unwrap().length, 50);
        assert_eq!(outcome.stats.calls_completed, 1);
        assert_eq!(outcome.stats.discarded(), 0);
    }

    #[test]
    fn test_nested_calls() {
        let registry = registry_with(&[("R", "P1", None, None)]);
        let outcome = run_lines(
            registry,
            &["10 P1 enter a", "20 P1 enter b", "30 P1 exit b", "40 P1 exit a"],
        );

        let tree = outcome.trees.get("R").unwrap();
        assert_eq!(tree.root("a").unwrap().length, 40);
        assert_eq!(tree.node(&["a", "b"]).unwrap().length, 10);
        assert!(outcome.unclosed.is_empty());
    }

    #[test]
    fn test_protocol_errors_only_touch_stats() {
        let registry = registry_with(&[("R", "P1", None, None)]);
        let outcome = run_lines(
            registry,
            &[
                "10 P1 enter a",
                "garbage",
                "unknown P1 exit a",
                "15 P9 exit a",
                "17 P1 exit zzz",
                "20 P1 exit a",
            ],
        );

        assert_eq!(outcome.stats.lines_received, 6);
        assert_eq!(outcome.stats.malformed_lines, 1);
        assert_eq!(outcome.stats.unknown_timestamps, 1);
        assert_eq!(outcome.stats.undeclared_units, 1);
        assert_eq!(outcome.stats.stack_mismatches, 1);
        assert_eq!(outcome.stats.discarded(), 4);

        let tree = outcome.trees.get("R").unwrap();
        assert_eq!(tree.root("a").unwrap().length, 10);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_extreme_timestamps_do_not_abort() {
        let registry = registry_with(&[("R", "P1", None, None)]);
        let outcome = run_lines(
            registry,
            &[
                "-9223372036854775808 P1 enter f",
                "9223372036854775807 P1 exit f",
                "-9223372036854775807 P1 exit f",
                "0 P1 enter g",
                "4611686018427387904 P1 exit g",
                "0 P1 enter g",
                "4611686018427387904 P1 exit g",
            ],
        );

        assert_eq!(outcome.stats.duration_overflows, 1);
        assert_eq!(outcome.stats.discarded(), 1);
        let tree = outcome.trees.get("R").unwrap();
        assert_eq!(tree.root("f").unwrap().length, 1);
        assert_eq!(tree.root("g").unwrap().length, i64::MAX);
        assert!(outcome.unclosed.is_empty());
    }

    #[test]
    fn test_event_outside_window_is_ignored() {
        let registry = registry_with(&[("R", "P1", Some(100), Some(200))]);
        let outcome = run_lines(registry, &["50 P1 enter f", "60 P1 exit f"]);

        assert!(outcome.trees.is_empty());
        assert_eq!(outcome.stats.events_dispatched, 0);
        assert_eq!(outcome.stats.undeclared_units, 0);
    }

    #[test]
    fn test_event_matching_several_regions() {
        let registry = registry_with(&[
            ("outer", "P1", None, None),
            ("inner", "P1", Some(10), None),
        ]);
        let outcome = run_lines(
            registry,
            &["0 P1 enter a", "10 P1 enter b", "15 P1 exit b", "20 P1 exit a"],
        );

        let outer = outcome.trees.get("outer").unwrap();
        assert_eq!(outer.root("a").unwrap().length, 25);
        assert_eq!(outer.node(&["a", "b"]).unwrap().length, 5);

        // "inner" never saw a's enter, so b is a root there and a's exit mismatches
        let inner = outcome.trees.get("inner").unwrap();
        assert_eq!(inner.root("b").unwrap().length, 5);
        assert!(inner.root("a").is_none());
        assert_eq!(outcome.stats.stack_mismatches, 1);
    }

    #[test]
    fn test_unclosed_calls_are_reported() {
        let registry = registry_with(&[("R", "P1", None, None)]);
        let outcome = run_lines(registry, &["1 P1 enter a", "2 P1 enter b", "3 P1 exit b"]);

        assert_eq!(outcome.unclosed.len(), 1);
        assert_eq!(outcome.unclosed[0].frames.len(), 1);
        assert_eq!(outcome.trees.get("R").unwrap().root("a").unwrap().length, 1);
    }

    #[test]
    fn test_timeout_with_running_producer_keeps_waiting() {
        let registry = registry_with(&[("R", "P1", None, None)]);
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let host = StaticHost::new(0).with_producer_flag(flag);

        let mut source = ScriptedSource::new(vec![
            Ok(Polled::Line("1 P1 enter f".to_string())),
            Ok(Polled::Timeout),
            Ok(Polled::Timeout),
            Ok(Polled::Line("4 P1 exit f".to_string())),
            Ok(Polled::Closed),
        ]);

        let mut ingestor = EventIngestor::new(registry, StackScope::Shared);
        ingestor.run(&mut source, &host).unwrap();

        assert_eq!(ingestor.stats().timeouts, 2);
        assert_eq!(ingestor.trees().get("R").unwrap().root("f").unwrap().length, 3);
    }

    #[test]
    fn test_timeout_with_stopped_producer_drains_and_ends() {
        let registry = registry_with(&[("R", "P1", None, None)]);
        let mut source = ScriptedSource::new(vec![
            Ok(Polled::Line("1 P1 enter f".to_string())),
            Ok(Polled::Timeout),
            Ok(Polled::Line("2 P1 exit f".to_string())),
        ]);

        let mut ingestor = EventIngestor::new(registry, StackScope::Shared);
        ingestor.run(&mut source, &StaticHost::new(0)).unwrap();

        // The trailing line was drained, then the empty poll ended the run
        assert_eq!(ingestor.trees().get("R").unwrap().root("f").unwrap().length, 1);
        assert_eq!(source.polls, 4);
    }

    #[test]
    fn test_channel_error_aborts() {
        let registry = registry_with(&[("R", "P1", None, None)]);
        let mut source = ScriptedSource::new(vec![
            Ok(Polled::Line("1 P1 enter f".to_string())),
            Err(Error::Channel("receive failed".to_string())),
            Ok(Polled::Line("2 P1 exit f".to_string())),
        ]);

        let mut ingestor = EventIngestor::new(registry, StackScope::Shared);
        let err = ingestor.run(&mut source, &StaticHost::new(0)).unwrap_err();
        assert!(matches!(err, Error::Channel(_)));
        assert_eq!(ingestor.stats().lines_received, 1);
    }

    #[test]
    fn test_host_failure_on_timeout_aborts() {
        struct BrokenHost;
        impl Host for BrokenHost {
            fn workflow_start_time(&self) -> Result<i64> {
                Ok(0)
            }
            fn workflow_end_time(&self) -> Result<i64> {
                Ok(0)
            }
            fn is_producer_running(&self) -> Result<bool> {
                Err(Error::host_query("producer status", "host went away"))
            }
            fn output_dir(&self) -> Result<std::path::PathBuf> {
                Ok(std::path::PathBuf::new())
            }
        }

        let registry = registry_with(&[("R", "P1", None, None)]);
        let mut source = ScriptedSource::new(vec![Ok(Polled::Timeout)]);
        let mut ingestor = EventIngestor::new(registry, StackScope::Shared);
        assert!(matches!(
            ingestor.run(&mut source, &BrokenHost),
            Err(Error::HostQuery { .. })
        ));
    }

    #[test]
    fn test_region_declared_mid_stream() {
        let registry = Arc::new(RegionRegistry::new());
        let mut ingestor = EventIngestor::new(Arc::clone(&registry), StackScope::Shared);

        ingestor.ingest_line("5 P1 enter early");
        assert_eq!(ingestor.stats().undeclared_units, 1);

        registry.begin("R", "P1", Timestamp::Known(10));
        ingestor.ingest_line("10 P1 enter f");
        ingestor.ingest_line("12 P1 exit f");

        let outcome = ingestor.finish();
        assert_eq!(outcome.trees.get("R").unwrap().root("f").unwrap().length, 2);
        assert!(outcome.trees.get("R").unwrap().root("early").is_none());
    }

    #[test]
    fn test_ingest_event_directly() {
        use crate::event::Direction;

        let registry = registry_with(&[("R", "P1", None, None)]);
        let mut ingestor = EventIngestor::new(registry, StackScope::PerUnit);
        ingestor.ingest_event(&TraceEvent::new(1, "P1", Direction::Enter, "g"));
        ingestor.ingest_event(&TraceEvent::new(9, "P1", Direction::Exit, "g"));

        assert_eq!(ingestor.stats().lines_received, 0);
        assert_eq!(ingestor.trees().get("R").unwrap().root("g").unwrap().length, 8);
    }
}
