//! babel - command-line front end for the query engine
//!
//! One-shot: `babel hello world` runs one query and exits once it settles.
//! Interactive: without TEXT every stdin line is fed as debounced input; at
//! end of input any pending line is flushed and the last query awaited.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use babel_common::config::{BabelConfig, ConfigResolver, LoggingConfig};
use babel_common::events::{EventBus, QueryEvent, RequestId};
use babel_common::Language;
use babel_query::providers::{HttpDetector, HttpProvider, LoggingAudioPlayer};
use babel_query::{
    Collaborators, ConsensusEngine, Detector, LocalChain, Provider, QueryOrchestrator,
    QuerySettings,
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod render;

const EVENT_CAPACITY: usize = 256;

/// Command-line arguments for babel
#[derive(Parser, Debug)]
#[command(name = "babel")]
#[command(about = "Detect the language of a text and query every configured translator")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, env = "BABEL_CONFIG")]
    config: Option<PathBuf>,

    /// Source language for TEXT (`auto` runs detection)
    #[arg(short, long)]
    from: Option<Language>,

    /// Target language (`auto` picks the other preferred language)
    #[arg(short, long)]
    to: Option<Language>,

    /// Text to translate; reads stdin when omitted
    #[arg(trailing_var_arg = true)]
    text: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new(args.config.clone());
    let config = resolver.load().context("Failed to load configuration")?;

    init_logging(&config.logging)?;

    match resolver.resolve().filter(|p| p.exists()) {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Using compiled default configuration"),
    }
    // Validation warnings emitted during load predate the subscriber
    config.validate().context("Invalid configuration")?;

    let mut settings = QuerySettings::from_config(&config);
    if let Some(to) = &args.to {
        settings.target_language = to.clone();
    }

    let collaborators = build_collaborators(&config)?;
    let orchestrator =
        QueryOrchestrator::spawn(collaborators, settings, EventBus::new(EVENT_CAPACITY));
    let mut events = orchestrator.subscribe();

    if args.text.is_empty() {
        run_interactive(&orchestrator, &mut events).await?;
    } else {
        let source = args.from.clone().unwrap_or_else(Language::auto);
        let target = args.to.clone().unwrap_or_else(Language::auto);
        let id = orchestrator
            .submit(args.text.join(" "), source, target)
            .context("Failed to submit query")?;
        wait_until_settled(&mut events, id).await?;
    }

    orchestrator.shutdown().await;
    Ok(())
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides the configured level. Logs go to stderr, or to the
/// configured file, so stdout only carries results.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = match &config.file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };
    let stderr_layer = file_layer
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Build HTTP adapters for every configured entry that has an endpoint
fn build_collaborators(config: &BabelConfig) -> Result<Collaborators> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    for entry in &config.providers {
        match HttpProvider::from_config(entry) {
            Some(provider) => {
                let provider = provider
                    .with_context(|| format!("Failed to build provider '{}'", entry.id))?;
                providers.push(Arc::new(provider));
            }
            None => warn!(provider = %entry.id, "Provider has no endpoint, skipping"),
        }
    }

    let mut detectors: Vec<Arc<dyn Detector>> = Vec::new();
    for entry in &config.detection.detectors {
        match HttpDetector::from_config(entry) {
            Some(detector) => {
                let detector = detector
                    .with_context(|| format!("Failed to build detector '{}'", entry.id))?;
                detectors.push(Arc::new(detector));
            }
            None => warn!(detector = %entry.id, "Detector has no endpoint, skipping"),
        }
    }

    let consensus = ConsensusEngine::new(detectors, LocalChain::whatlang());
    info!(
        providers = providers.len(),
        detectors = ?consensus.detector_ids().collect::<Vec<_>>(),
        "Adapters initialized"
    );

    Ok(Collaborators {
        providers,
        consensus,
        audio: Arc::new(LoggingAudioPlayer),
    })
}

async fn run_interactive(
    orchestrator: &QueryOrchestrator,
    events: &mut broadcast::Receiver<QueryEvent>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => orchestrator.input(line)?,
                    None => break,
                }
            }
            event = events.recv() => {
                if !print_received(event)? {
                    return Ok(());
                }
            }
        }
    }

    // End of input: skip the debounce wait, never re-issue a line already sent
    match orchestrator
        .flush_input()
        .await
        .context("Failed to flush input")?
    {
        Some(id) => wait_until_settled(events, id).await,
        None => {
            // Already settled; show what is still buffered
            while let Ok(event) = events.try_recv() {
                render::print_event(&event);
            }
            Ok(())
        }
    }
}

/// Print events until request `id` settles
async fn wait_until_settled(
    events: &mut broadcast::Receiver<QueryEvent>,
    id: RequestId,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!(request_id = %id, "Interrupted");
                return Ok(());
            }
            event = events.recv() => {
                let settled = matches!(
                    &event,
                    Ok(QueryEvent::Updated(update))
                        if update.request_id == id && update.phase.is_terminal()
                );
                if !print_received(event)? {
                    bail!("Orchestrator stopped before request {} settled", id);
                }
                if settled {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns `false` once the bus is closed
fn print_received(event: Result<QueryEvent, RecvError>) -> Result<bool> {
    match event {
        Ok(event) => {
            render::print_event(&event);
            Ok(true)
        }
        Err(RecvError::Lagged(skipped)) => {
            // The next update carries the complete list again
            warn!(skipped, "Display fell behind, skipping updates");
            Ok(true)
        }
        Err(RecvError::Closed) => Ok(false),
    }
}
