//! Capture relay: drives the interaction capture pipeline from a page
//! snapshot and a feed of raw browser events, delivering records to the
//! collector over WebSocket or as `CATCH` console lines.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use capture_core::config::{CaptureConfig, SinkKind, TransportConfig, WheelMode};
use capture_core::dom::{Document, PageSnapshot};
use capture_core::sink::RecordSink;
use capture_pipeline::{CaptureDispatcher, RawEvent, SelectorResolver};
use capture_transport::{ConnectionState, ConsoleSink, Transport};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "capture-relay")]
#[command(about = "Relay page interactions through the capture pipeline to a collector")]
#[command(version)]
struct Cli {
    /// Config file (TOML, JSON or YAML by extension)
    #[arg(long, env = "INTERACTION_CAPTURE_CONFIG")]
    config: Option<PathBuf>,

    /// Page snapshot (JSON) the events refer to
    #[arg(long)]
    snapshot: PathBuf,

    /// NDJSON feed of raw events; stdin when omitted
    #[arg(long)]
    feed: Option<PathBuf>,

    /// Collector namespace object as a page would supply it, e.g. '{"port":"9000"}'
    #[arg(long)]
    namespace: Option<String>,

    /// Collector host (overrides config)
    #[arg(long, env = "INTERACTION_CAPTURE__TRANSPORT__HOST")]
    host: Option<String>,

    /// Collector port (overrides config)
    #[arg(long, env = "INTERACTION_CAPTURE__TRANSPORT__PORT")]
    port: Option<u16>,

    /// Record sink (overrides config)
    #[arg(long, value_enum)]
    sink: Option<SinkArg>,

    /// Emit every wheel event instead of coalescing bursts
    #[arg(long, default_value_t = false)]
    raw_wheel: bool,

    /// How long to wait for the collector before feeding events
    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Grace period after the feed ends so queued records reach the collector
    #[arg(long, default_value_t = 250)]
    linger_ms: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SinkArg {
    Websocket,
    Console,
}

impl From<SinkArg> for SinkKind {
    fn from(arg: SinkArg) -> Self {
        match arg {
            SinkArg::Websocket => SinkKind::Websocket,
            SinkArg::Console => SinkKind::Console,
        }
    }
}

/// One line of the feed.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
enum FeedEntry {
    Event(RawEvent),
    Scroll { x: f64, y: f64 },
    Pause { ms: u64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is reserved for CATCH lines.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "capture_relay=info,capture_pipeline=info,capture_transport=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let config = build_config(&cli)?;
    info!(
        collector = %config.transport.url()?,
        sink = ?config.capture.sink,
        wheel_mode = ?config.capture.wheel_mode,
        tracked = ?config.capture.tracked,
        "Configuration loaded"
    );

    let snapshot_text = tokio::fs::read_to_string(&cli.snapshot)
        .await
        .with_context(|| format!("reading snapshot {}", cli.snapshot.display()))?;
    let snapshot: PageSnapshot =
        serde_json::from_str(&snapshot_text).context("parsing page snapshot")?;
    let mut document = Document::from_snapshot(&snapshot)?;

    let (sink, transport) = build_sink(&config, Duration::from_millis(cli.connect_timeout_ms)).await?;
    let dispatcher = CaptureDispatcher::new(&config.capture, SelectorResolver::new(), sink);

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &cli.feed {
        Some(path) => Box::new(BufReader::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening feed {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let (dispatched, skipped) = run_feed(reader, &mut document, &dispatcher).await?;
    dispatcher.flush();

    if let Some(transport) = &transport {
        if transport.state() == ConnectionState::Open {
            tokio::time::sleep(Duration::from_millis(cli.linger_ms)).await;
        }
    }

    info!(dispatched, skipped, "Feed complete");
    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<CaptureConfig> {
    let mut config = match &cli.config {
        Some(path) => CaptureConfig::load_from(Some(path.as_path()))
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CaptureConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            CaptureConfig::default()
        }),
    };

    if let Some(namespace) = &cli.namespace {
        let value: serde_json::Value =
            serde_json::from_str(namespace).context("parsing --namespace")?;
        config.transport = TransportConfig::from_namespace(&value)?;
    }

    // Apply CLI overrides
    if let Some(host) = &cli.host {
        config.transport.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.transport.port = port;
    }
    if let Some(sink) = cli.sink {
        config.capture.sink = sink.into();
    }
    if cli.raw_wheel {
        config.capture.wheel_mode = WheelMode::Raw;
    }

    config.validate()?;
    Ok(config)
}

async fn build_sink(
    config: &CaptureConfig,
    connect_timeout: Duration,
) -> anyhow::Result<(Arc<dyn RecordSink>, Option<Arc<Transport>>)> {
    match config.capture.sink {
        SinkKind::Console => Ok((Arc::new(ConsoleSink::stdout()) as Arc<dyn RecordSink>, None)),
        SinkKind::Websocket => {
            let transport = Arc::new(Transport::connect(&config.transport)?);
            if !transport
                .wait_for_state(ConnectionState::Open, connect_timeout)
                .await
            {
                warn!(
                    collector = %transport.url(),
                    "Collector not reachable yet, records are dropped until it connects"
                );
            }
            Ok((transport.clone() as Arc<dyn RecordSink>, Some(transport)))
        }
    }
}

/// Feed every line to the dispatcher. Malformed lines are logged and skipped.
async fn run_feed(
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    document: &mut Document,
    dispatcher: &CaptureDispatcher,
) -> anyhow::Result<(u64, u64)> {
    let mut lines = reader.lines();
    let mut dispatched = 0u64;
    let mut skipped = 0u64;
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let entry: FeedEntry = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed feed line");
                skipped += 1;
                continue;
            }
        };

        match entry {
            FeedEntry::Event(raw) => {
                if let Some(target) = raw.target().filter(|t| !document.contains(*t)) {
                    warn!(line = line_no, target = target.0, "Skipping event on unknown node");
                    skipped += 1;
                    continue;
                }
                if let RawEvent::Input {
                    target,
                    value: Some(value),
                } = &raw
                {
                    document.set_value(*target, value.clone())?;
                }
                dispatcher.dispatch(document, &raw);
                dispatched += 1;
            }
            FeedEntry::Scroll { x, y } => document.set_scroll(x, y),
            FeedEntry::Pause { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
    }

    Ok((dispatched, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_core::config::CaptureSettings;
    use capture_core::sink::capture_sink;
    use capture_core::types::EventClass;

    #[test]
    fn test_feed_entry_format() {
        let entry: FeedEntry = serde_json::from_str(r#"{"scroll": {"x": 0, "y": 120}}"#).unwrap();
        assert_eq!(entry, FeedEntry::Scroll { x: 0.0, y: 120.0 });

        let entry: FeedEntry =
            serde_json::from_str(r#"{"event": {"kind": "wheel", "delta_x": 0, "delta_y": 3}}"#)
                .unwrap();
        assert!(matches!(entry, FeedEntry::Event(RawEvent::Wheel { .. })));
    }

    #[tokio::test]
    async fn test_run_feed_applies_scroll_and_skips_bad_lines() {
        let snapshot: PageSnapshot = serde_json::from_value(serde_json::json!({
            "body": [{"tag": "input", "id": "q", "offset_left": 4, "offset_top": 8}]
        }))
        .unwrap();
        let mut document = Document::from_snapshot(&snapshot).unwrap();
        let sink = capture_sink();
        let settings = CaptureSettings {
            wheel_mode: WheelMode::Raw,
            ..CaptureSettings::default()
        };
        let dispatcher = CaptureDispatcher::new(
            &settings,
            SelectorResolver::new(),
            sink.clone() as Arc<dyn RecordSink>,
        );

        let feed = [
            r#"{"scroll": {"x": 0, "y": 30}}"#,
            r#"{"event": {"kind": "input", "target": 2, "value": "rust"}}"#,
            r#"not json"#,
            r#"{"event": {"kind": "click", "target": 99, "x": 1, "y": 1}}"#,
            "",
        ]
        .join("\n");
        let reader: Box<dyn AsyncBufRead + Unpin + Send> =
            Box::new(BufReader::new(std::io::Cursor::new(feed.into_bytes())));

        let (dispatched, skipped) = run_feed(reader, &mut document, &dispatcher).await.unwrap();
        assert_eq!((dispatched, skipped), (1, 2));
        assert_eq!(sink.classes(), vec![EventClass::Wheel, EventClass::Input]);
    }
}
