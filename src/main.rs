use anyhow::{Context, Result};
use clap::Parser;
use regionprof::cli::Cli;
use regionprof::config::{RegionDeclaration, SessionFile};
use regionprof::handshake::FixedReply;
use regionprof::host::StaticHost;
use regionprof::session::Session;
use regionprof::source;
use regionprof::timestamp::Timestamp;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for diagnostics on stderr
///
/// Discarded events are reported at warn level; `--debug` enables
/// everything down to trace. Directives in `RUST_LOG` take precedence
/// over both.
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Apply a declaration the way a host would: begin, then end if bounded
fn declare(session: &Session, region: &RegionDeclaration) -> Result<()> {
    let registry = session.registry();
    registry.begin(&region.name, &region.unit, Timestamp::from(region.start));
    registry
        .end(&region.name, &region.unit, Timestamp::from(region.end))
        .with_context(|| format!("Failed to end region '{}'", region.name))?;
    Ok(())
}

/// Open the event stream (file or stdin)
fn open_events(cli: &Cli) -> Result<Box<dyn BufRead + Send>> {
    match &cli.events {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open event stream: {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.debug);

    // Session file first, then command-line overrides
    let mut file = match &cli.session {
        Some(path) => SessionFile::from_toml(path)?,
        None => SessionFile::default(),
    };
    if let Some(scope) = cli.stack_scope {
        file.session.stack_scope = scope;
    }
    if let Some(timeout) = cli.poll_timeout_ms {
        if timeout == 0 {
            anyhow::bail!("Invalid value for --poll-timeout-ms: 0 (must be > 0)");
        }
        file.session.poll_timeout_ms = timeout;
    }
    if let Some(name) = &cli.output_file {
        file.session.output_file = name.clone();
    }
    if let Some(mode) = cli.api_mode {
        file.session.api_mode = Some(mode);
    }

    let workflow_start = cli.workflow_start.or(file.workflow.start).context(
        "Workflow start time is required (--workflow-start or [workflow] start in the session file)",
    )?;
    let workflow_end = cli.workflow_end.or(file.workflow.end);

    let mut session = Session::new(file.session.clone());

    // Configuration errors are fatal before any event is read
    match session.config().api_mode {
        Some(mode) => {
            session.handshake(&mut FixedReply::new(mode.as_str()))?;
        }
        None => tracing::info!("no API mode configured, skipping handshake"),
    }

    for region in file.regions.iter().chain(cli.regions.iter()) {
        declare(&session, region)?;
    }
    if session.registry().is_empty() {
        eprintln!("[regionprof: warning: no regions declared, every event will be discarded]");
    }

    let (events, reader) = source::spawn_line_reader(open_events(&cli)?)?;

    let mut host = StaticHost::new(workflow_start)
        .with_output_dir(&cli.output_dir)
        .with_producer_flag(reader.running_flag());
    if let Some(end) = workflow_end {
        host = host.with_workflow_end(end);
    }

    let ingestion = session.spawn_ingestion(events, host.clone())?;
    let outcome = ingestion.join()?;
    reader.join()?;

    let stats = outcome.stats.clone();
    let (report, path) = session.finalize(outcome, &host)?;

    eprintln!(
        "[regionprof: {} lines, {} calls completed, {} discarded; {} regions written to {}]",
        stats.lines_received,
        stats.calls_completed,
        stats.discarded(),
        report.len(),
        path.display()
    );

    if cli.summary {
        report.print_summary();
    }

    Ok(())
}
