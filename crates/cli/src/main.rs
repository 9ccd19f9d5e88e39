//! Pulse CLI entry point.
//!
//! Reads tickets from a JSON or JSON Lines file, analyses them with the
//! configured provider, and writes the batch report as JSON.
//!
//! 1. **Load configuration**: `--config`, else `./pulse.toml` if present,
//!    else defaults; command-line flags override file values.
//! 2. **Wire observability**: see [`cli::observability`].
//! 3. **Construct infrastructure**: provider adapter, completion client, cache
//!    partitions and the analyzer, each built once and shared by reference.
//! 4. **Run**: with `--results`, tickets that already have a stored result are
//!    skipped and new results are appended to that file.
//!
//! Ctrl-C stops new tickets from starting; in-flight calls finish and the
//! partial report is still written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::config::{load_config, LogFormat, PulseConfig};
use cli::observability;
use cli::tickets::{FileTicketSource, JsonlResultStore};
use nodes::{CachePartitions, CompletionClient, LogProgress, TicketAnalyzer};
use pipeline::{AnalysisMode, ProviderId, Ticket, TicketSource};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG_FILE: &str = "pulse.toml";

/// Sentiment and priority analysis for support tickets.
#[derive(Debug, Parser)]
#[command(name = "pulse", version, about)]
struct Args {
    /// Tickets to analyse (JSON array or JSON Lines).
    tickets: PathBuf,

    /// Configuration file.
    #[arg(short, long, env = "PULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Provider: anthropic, openai or ollama.
    #[arg(long)]
    provider: Option<ProviderId>,

    /// Analysis mode: basic or enhanced.
    #[arg(long)]
    mode: Option<AnalysisMode>,

    /// Model override for the selected provider.
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    max_workers: Option<usize>,

    #[arg(long)]
    batch_chunk: Option<usize>,

    /// Total provider attempts per ticket.
    #[arg(long)]
    max_retries: Option<u32>,

    #[arg(long)]
    temperature: Option<f32>,

    /// Initial per-attempt timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// OTLP gRPC endpoint for span export.
    #[arg(long)]
    otlp_endpoint: Option<String>,

    /// JSON Lines result store; tickets with a stored result are skipped.
    #[arg(long)]
    results: Option<PathBuf>,

    /// Write the report here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut PulseConfig) {
        let analysis = &mut config.analysis;
        if let Some(provider) = self.provider {
            analysis.provider = provider.as_str().to_string();
        }
        if let Some(mode) = self.mode {
            analysis.mode = mode.as_str().to_string();
        }
        if let Some(model) = &self.model {
            analysis.model = Some(model.clone());
        }
        if let Some(v) = self.max_workers {
            analysis.max_workers = v;
        }
        if let Some(v) = self.batch_chunk {
            analysis.batch_chunk = v;
        }
        if let Some(v) = self.max_retries {
            analysis.max_retries = v;
        }
        if let Some(v) = self.temperature {
            analysis.temperature = v;
        }
        if let Some(v) = self.timeout_secs {
            analysis.timeout_secs = v;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(endpoint) = &self.otlp_endpoint {
            config.logging.otlp_endpoint = Some(endpoint.clone());
        }
    }
}

fn resolve_config(args: &Args) -> Result<PulseConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => load_config(Path::new(DEFAULT_CONFIG_FILE))?,
        None => PulseConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration after applying flags")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;
    let telemetry = observability::init(&config.logging)?;

    let outcome = run(&args, &config).await;
    if let Err(err) = &outcome {
        let message = format!("{err:#}");
        tracing::error!(error = %message, "Pulse run failed");
    }

    telemetry.shutdown();
    outcome
}

async fn run(args: &Args, config: &PulseConfig) -> Result<()> {
    let analysis = config.analysis_config()?;
    let settings = config.provider_settings(analysis.provider, |var| std::env::var(var).ok());

    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let provider = llm::build_provider(analysis.provider, settings, http)?;
    let client = Arc::new(CompletionClient::new([provider]).with_backoff(config.backoff_config()));

    let caches = CachePartitions::new(config.cache);
    let analyzer = TicketAnalyzer::new(client, caches.analyses.clone(), analysis)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight analyses");
            on_signal.cancel();
        }
    });

    let tickets = FileTicketSource::new(&args.tickets).fetch_tickets().await?;
    tracing::info!(
        tickets = tickets.len(),
        provider = %analyzer.config().provider,
        mode = %analyzer.config().mode,
        "Starting analysis"
    );

    match &args.results {
        Some(path) => {
            let store = JsonlResultStore::open(path).await?;
            let report = analyzer
                .analyze_pending(&tickets, &store, &cancel, &LogProgress)
                .await?;
            write_report(&report, args.output.as_deref())?;
        }
        None => {
            let requests = tickets.iter().map(Ticket::to_request).collect();
            let report = analyzer.analyze_batch(requests, &cancel, &LogProgress).await;
            write_report(&report, args.output.as_deref())?;
        }
    }

    let stats = caches.analyses.stats().await;
    tracing::info!(
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        cached = stats.len,
        "Analysis cache statistics"
    );
    Ok(())
}

fn write_report<T: Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialise report")?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write report: {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
