//! batchline-demo — drive a batch accumulator with synthetic traffic.
//!
//! Feeds numbered messages through an in-process channel endpoint into a
//! logging sink, optionally failing every Nth message, then shuts down and
//! prints the accumulator stats as JSON.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info, warn};

use batchline_accumulator::{
    BatchAccumulator, BatchError, BatchPolicy, ChannelEndpoint, FnSink, InstrumentedSink, Sink,
    SourceProvider,
};
use batchline_core::config::load_dotenv;
use batchline_core::logging::init_tracing;
use batchline_core::{AccumulatorConfig, BatchSettings};

// ── CLI ─────────────────────────────────────────────────────────────

/// Run a batch accumulator against a synthetic message stream.
#[derive(Parser, Debug)]
#[command(name = "batchline-demo", version, about)]
struct Cli {
    /// Path to an accumulator TOML config. Env vars are used when omitted.
    #[arg(long, env = "BATCHLINE_CONFIG")]
    config: Option<String>,

    /// Override the number of fill iterations per cycle.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the content cap (0 disables it).
    #[arg(long)]
    out_batch_size: Option<usize>,

    /// Override the fill-phase budget in milliseconds.
    #[arg(long)]
    batch_timeout_ms: Option<u64>,

    /// Number of messages to produce.
    #[arg(long, default_value_t = 1000)]
    messages: u64,

    /// Delay between produced messages in milliseconds.
    #[arg(long, default_value_t = 2)]
    interval_ms: u64,

    /// Fail processing of every Nth message (0 = never).
    #[arg(long, default_value_t = 0)]
    fail_every: u64,

    /// How long to run before shutting down, in seconds.
    #[arg(long, default_value_t = 5)]
    run_secs: u64,
}

#[derive(Debug, Clone)]
struct DemoMessage {
    seq: u64,
    payload: String,
}

fn load_config(cli: &Cli) -> anyhow::Result<AccumulatorConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let cfg = AccumulatorConfig::from_file(path)?;
            info!(path = %path, "loaded accumulator config");
            cfg
        }
        None => AccumulatorConfig {
            name: "demo".to_string(),
            batch: BatchSettings::from_env(),
        },
    };
    if let Some(v) = cli.batch_size {
        config.batch.batch_size = v;
    }
    if let Some(v) = cli.out_batch_size {
        config.batch.out_batch_size = v;
    }
    if let Some(v) = cli.batch_timeout_ms {
        config.batch.batch_timeout_ms = v;
    }
    config.validate()?;
    Ok(config)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let endpoint = Arc::new(ChannelEndpoint::<DemoMessage>::new(1024));
    let fail_every = cli.fail_every;
    let sink = Arc::new(InstrumentedSink::new(FnSink::new(
        "log",
        move |message: DemoMessage| async move {
            if fail_every > 0 && message.seq % fail_every == 0 {
                return Err(BatchError::Process(format!(
                    "synthetic failure on message {}",
                    message.seq
                )));
            }
            debug!(seq = message.seq, payload = %message.payload, "message processed");
            Ok(())
        },
    )));

    let provider: Arc<dyn SourceProvider<DemoMessage>> = endpoint.clone();
    let delivery: Arc<dyn Sink<DemoMessage>> = sink.clone();
    let accumulator = BatchAccumulator::builder(provider, delivery)
        .config(&config)
        .build();
    let policy: BatchPolicy = accumulator.policy();
    info!(
        accumulator = %accumulator,
        batch_size = policy.batch_size,
        batch_timeout = ?policy.batch_timeout,
        "demo configured"
    );

    accumulator.start().await?;

    // Producer: numbered messages at a fixed interval.
    let tx = endpoint.sender();
    let total = cli.messages;
    let interval = Duration::from_millis(cli.interval_ms);
    let producer = tokio::spawn(async move {
        for seq in 1..=total {
            let message = DemoMessage {
                seq,
                payload: format!("message-{seq}"),
            };
            if tx.send(message).await.is_err() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    });

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(cli.run_secs)) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
        }
    }

    producer.abort();
    if let Err(e) = accumulator.shutdown().await {
        warn!(error = %e, "accumulator shutdown reported errors");
    }

    info!(
        processed = sink.processed(),
        failed = sink.failed(),
        "demo finished"
    );
    println!("{}", serde_json::to_string_pretty(&accumulator.stats())?);
    Ok(())
}
