//! CLI argument parsing for regionprof

use crate::call_stack::StackScope;
use crate::config::RegionDeclaration;
use crate::handshake::ApiMode;
use crate::timestamp::Timestamp;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "regionprof")]
#[command(version)]
#[command(
    about = "Attribute enter/exit trace events to time-bounded regions and build per-region call trees",
    long_about = None
)]
pub struct Cli {
    /// Session file (TOML) with regions, workflow bounds and settings
    #[arg(short = 's', long = "session", value_name = "FILE")]
    pub session: Option<PathBuf>,

    /// Event stream to read, one `<ts> <unit> <enter|exit> <label>` per line (default: stdin)
    #[arg(short = 'e', long = "events", value_name = "FILE")]
    pub events: Option<PathBuf>,

    /// Declare a region as UNIT:NAME[:START[:END]] (repeatable; START/END may be "unknown")
    #[arg(short = 'r', long = "region", value_name = "SPEC", value_parser = parse_region_spec)]
    pub regions: Vec<RegionDeclaration>,

    /// Directory the report is written into
    #[arg(short = 'o', long = "output-dir", value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Report file name inside the output directory
    #[arg(long = "output-file", value_name = "NAME")]
    pub output_file: Option<String>,

    /// Workflow start timestamp (overrides the session file)
    #[arg(long = "workflow-start", value_name = "TS", allow_hyphen_values = true)]
    pub workflow_start: Option<i64>,

    /// Workflow end timestamp (overrides the session file)
    #[arg(long = "workflow-end", value_name = "TS", allow_hyphen_values = true)]
    pub workflow_end: Option<i64>,

    /// Share one call stack per region, or keep one per region and unit
    #[arg(long = "stack-scope", value_enum)]
    pub stack_scope: Option<StackScope>,

    /// Milliseconds to wait for an event before checking the producer
    #[arg(long = "poll-timeout-ms", value_name = "MS")]
    pub poll_timeout_ms: Option<u64>,

    /// Reply to the API mode handshake request
    #[arg(long = "api-mode", value_enum)]
    pub api_mode: Option<ApiMode>,

    /// Print per-region call trees to stderr after writing the report
    #[arg(short = 'c', long = "summary")]
    pub summary: bool,

    /// Enable trace-level diagnostics
    #[arg(long = "debug")]
    pub debug: bool,
}

/// Parse `UNIT:NAME[:START[:END]]`
pub fn parse_region_spec(spec: &str) -> Result<RegionDeclaration, String> {
    let mut parts = spec.splitn(4, ':');
    let unit = parts.next().unwrap_or_default().trim();
    let name = parts.next().map(str::trim).unwrap_or_default();

    if unit.is_empty() || unit.contains(char::is_whitespace) {
        return Err(format!("invalid unit id in region '{}'", spec));
    }
    if name.is_empty() {
        return Err(format!("missing region name in '{}'", spec));
    }

    let bound = |part: Option<&str>| -> Result<Option<i64>, String> {
        match part.map(str::trim) {
            None | Some("") => Ok(None),
            Some(token) => token
                .parse::<Timestamp>()
                .map(Timestamp::known)
                .map_err(|e| format!("region '{}': {}", spec, e)),
        }
    };
    let start = bound(parts.next())?;
    let end = bound(parts.next())?;

    Ok(RegionDeclaration {
        unit: unit.to_string(),
        name: name.to_string(),
        start,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["regionprof"]);
        assert!(cli.session.is_none());
        assert!(cli.events.is_none());
        assert!(cli.regions.is_empty());
        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert!(!cli.summary);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "regionprof",
            "--session",
            "s.toml",
            "--events",
            "trace.log",
            "--workflow-start",
            "-100",
            "--workflow-end",
            "500",
            "--stack-scope",
            "per-unit",
            "--api-mode",
            "driver",
            "--poll-timeout-ms",
            "20",
            "-c",
        ]);
        assert_eq!(cli.session, Some(PathBuf::from("s.toml")));
        assert_eq!(cli.events, Some(PathBuf::from("trace.log")));
        assert_eq!(cli.workflow_start, Some(-100));
        assert_eq!(cli.workflow_end, Some(500));
        assert_eq!(cli.stack_scope, Some(StackScope::PerUnit));
        assert_eq!(cli.api_mode, Some(ApiMode::Driver));
        assert_eq!(cli.poll_timeout_ms, Some(20));
        assert!(cli.summary);
    }

    #[test]
    fn test_cli_repeated_regions() {
        let cli = Cli::parse_from(["regionprof", "-r", "P1:R:100", "--region", "P2:Q"]);
        assert_eq!(cli.regions.len(), 2);
        assert_eq!(cli.regions[0].start, Some(100));
        assert_eq!(cli.regions[1].name, "Q");
    }

    #[test]
    fn test_cli_rejects_bad_api_mode() {
        assert!(Cli::try_parse_from(["regionprof", "--api-mode", "opencl"]).is_err());
    }

    #[test]
    fn test_region_spec_forms() {
        let r = parse_region_spec("P1:R").unwrap();
        assert_eq!((r.start, r.end), (None, None));

        let r = parse_region_spec("P1:R:100:200").unwrap();
        assert_eq!((r.start, r.end), (Some(100), Some(200)));

        let r = parse_region_spec("P1:R:unknown:200").unwrap();
        assert_eq!((r.start, r.end), (None, Some(200)));

        let r = parse_region_spec("P1:R::-5").unwrap();
        assert_eq!((r.start, r.end), (None, Some(-5)));
    }

    #[test]
    fn test_region_spec_errors() {
        assert!(parse_region_spec("").is_err());
        assert!(parse_region_spec("P1").is_err());
        assert!(parse_region_spec("P1:").is_err());
        assert!(parse_region_spec("P 1:R").is_err());
        assert!(parse_region_spec("P1:R:soon").is_err());
    }
}
