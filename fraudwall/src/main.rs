// fraudwall/src/main.rs
//
// Fraudwall: streaming fraud decisions for retail banking transfers.
//
// Three operational modes:
//   kafka   consume banking.transfers.created from the broker (production)
//   tail    follow a JSONL file of transfer events (staging, any platform)
//   replay  replay a captured file at scaled speed (testing, research)
//
// Usage:
//   fraudwall --mode kafka
//   fraudwall --mode tail --path /var/log/gateway/transfers.jsonl
//   fraudwall --mode replay --path captured.jsonl --speed 10.0
//
// Blocklist propagation (operator-driven, runs and exits):
//   fraudwall --export-blocklist feed.ndjson
//   fraudwall --import-blocklist feed.ndjson

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fraudwall::bus::Ingress;
use fraudwall::engine::ProcessOutcome;
use fraudwall::events::TransactionEvent;
use fraudwall::load_shedder::LoadShedder;
use fraudwall::store::feed::{FeedExporter, FeedImporter};
use fraudwall::store::BlocklistStore;
use fraudwall::{AppConfig, EngineBuilder};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "fraudwall",
    about   = "Streaming fraud-decision engine for banking transfers",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "kafka")]
    mode: Mode,

    #[arg(long, default_value = "/var/log/fraudwall/transfers.jsonl",
          help = "JSONL transfer log (tail/replay modes)")]
    path: PathBuf,

    #[arg(long, default_value = "1.0", help = "Replay speed multiplier")]
    speed: f64,

    #[arg(long, default_value = "/tmp/fraudwall_output",
          help = "Decision output directory (tail/replay modes)")]
    output: PathBuf,

    #[arg(long, help = "Import a signed blocklist feed, then exit")]
    import_blocklist: Option<PathBuf>,

    #[arg(long, help = "Export the active blocklist as a signed feed, then exit")]
    export_blocklist: Option<PathBuf>,

    #[arg(long, help = "Deactivate a blocklist entry by id, then exit")]
    deactivate_blocklist: Option<uuid::Uuid>,

    #[arg(long, env = "FW_FEED_KEY", default_value = "", hide_env_values = true)]
    feed_key: String,

    #[arg(long, env = "FW_FEED_ORIGIN", default_value = "fraudwall")]
    feed_origin: String,
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum Mode {
    Kafka,   // production: broker-driven
    Tail,    // follow a live JSONL log
    Replay,  // replay a static JSONL file at scaled speed
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("fraudwall=info".parse()?))
        .compact()
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::from_env();

    if cli.import_blocklist.is_some()
        || cli.export_blocklist.is_some()
        || cli.deactivate_blocklist.is_some()
    {
        return run_feed_op(&cli, &cfg).await;
    }

    match cli.mode {
        Mode::Kafka => run_kafka(&cli, cfg).await,
        Mode::Tail | Mode::Replay => run_offline(&cli, cfg).await,
    }
}

// ── Kafka mode ────────────────────────────────────────────────────────────────

async fn run_kafka(_cli: &Cli, cfg: AppConfig) -> Result<()> {
    let metrics_port = cfg.runtime.metrics_port;
    let engine = EngineBuilder::new(cfg.clone()).build().await
        .context("engine assembly failed")?;

    if metrics_port > 0 {
        let metrics = Arc::clone(&engine.metrics);
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(metrics_port).await {
                error!("metrics endpoint failed: {}", e);
            }
        });
    }

    let shedder = LoadShedder::new();
    let ingress = Ingress::connect(&cfg.kafka, &cfg.runtime)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    // Housekeeping: stats line + shedder expiry.
    let stats_metrics = Arc::clone(&engine.metrics);
    let stats_shedder = Arc::clone(&shedder);
    tokio::spawn(async move {
        let start = std::time::Instant::now();
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            stats_shedder.expire();
            let processed = stats_metrics.events_processed.load(std::sync::atomic::Ordering::Relaxed);
            let shed = stats_shedder.shed_total.load(std::sync::atomic::Ordering::Relaxed);
            info!(
                "stats uptime={}s processed={} eps={:.1} shed={}",
                start.elapsed().as_secs(), processed,
                processed as f64 / start.elapsed().as_secs_f64(), shed,
            );
        }
    });

    // Blocks until shutdown, then drains in-flight analyses.
    ingress.run(Arc::clone(&engine.orchestrator), shedder, shutdown_rx).await;

    engine.close(Duration::from_secs(5)).await;
    Ok(())
}

// ── Offline modes ─────────────────────────────────────────────────────────────

async fn run_offline(cli: &Cli, cfg: AppConfig) -> Result<()> {
    let engine = EngineBuilder::new(cfg)
        .offline(cli.output.clone())
        .build().await
        .context("engine assembly failed")?;

    info!("output directory {}", cli.output.display());
    let outcome_counts = match cli.mode {
        Mode::Tail   => tail(cli, &engine).await?,
        Mode::Replay => replay(cli, &engine).await?,
        Mode::Kafka  => unreachable!(),
    };

    info!(
        "done: {} approved, {} suspicious, {} rejected, {} duplicates",
        outcome_counts.0, outcome_counts.1, outcome_counts.2, outcome_counts.3,
    );
    engine.close(Duration::from_secs(1)).await;
    Ok(())
}

type OutcomeCounts = (u64, u64, u64, u64);

async fn process_line(engine: &fraudwall::Engine, line: &str, counts: &mut OutcomeCounts) {
    let line = line.trim();
    if line.is_empty() { return; }

    let event: TransactionEvent = match serde_json::from_str(line) {
        Ok(ev) => ev,
        Err(e) => {
            warn!("parse error: {}", e);
            return;
        }
    };
    if let Err(e) = event.validate() {
        warn!("dropping invalid event {}: {}", event.event_id, e);
        return;
    }

    match engine.orchestrator.process(&event).await {
        Ok(ProcessOutcome::Completed { decision, .. }) => match decision {
            fraudwall::events::Decision::Approve    => counts.0 += 1,
            fraudwall::events::Decision::Suspicious => counts.1 += 1,
            fraudwall::events::Decision::Reject     => counts.2 += 1,
        },
        Ok(ProcessOutcome::Duplicate) => counts.3 += 1,
        Err(e) => error!("pipeline error for {}: {}", event.event_id, e),
    }
}

async fn tail(cli: &Cli, engine: &fraudwall::Engine) -> Result<OutcomeCounts> {
    let file = tokio::fs::File::open(&cli.path).await
        .with_context(|| format!("opening {}", cli.path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut counts = OutcomeCounts::default();

    info!("tailing {}", cli.path.display());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => process_line(engine, &line, &mut counts).await,
                None => tokio::time::sleep(Duration::from_millis(50)).await,
            },
        }
    }
    Ok(counts)
}

async fn replay(cli: &Cli, engine: &fraudwall::Engine) -> Result<OutcomeCounts> {
    let content = tokio::fs::read_to_string(&cli.path).await
        .with_context(|| format!("reading {}", cli.path.display()))?;

    let mut events: Vec<(i64, String)> = content.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| {
            serde_json::from_str::<TransactionEvent>(l).ok()
                .map(|ev| (ev.timestamp.timestamp_millis(), l.to_string()))
        })
        .collect();
    events.sort_by_key(|(ts, _)| *ts);
    info!("replaying {} events at {:.1}x", events.len(), cli.speed);

    let mut counts = OutcomeCounts::default();
    let Some(&(base_ts, _)) = events.first() else { return Ok(counts) };
    let base_wall = std::time::Instant::now();

    for (ts, line) in events {
        let offset = Duration::from_secs_f64(((ts - base_ts).max(0) as f64) / cli.speed / 1000.0);
        let target = base_wall + offset;
        let now = std::time::Instant::now();
        if target > now {
            tokio::time::sleep(target - now).await;
        }
        process_line(engine, &line, &mut counts).await;
    }
    Ok(counts)
}

// ── Blocklist feed operations ─────────────────────────────────────────────────

async fn run_feed_op(cli: &Cli, cfg: &AppConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&cfg.database.url)
        .await
        .context("database connection for feed operation")?;
    let store = BlocklistStore::with_pool(pool);
    let key = cli.feed_key.as_bytes().to_vec();

    if let Some(id) = cli.deactivate_blocklist {
        store.deactivate(id).await
            .map_err(|e| anyhow::anyhow!("deactivating {}: {}", id, e))?;
        info!("blocklist entry {} deactivated", id);
        return Ok(());
    }

    if let Some(ref path) = cli.export_blocklist {
        let entries = store.active_entries().await
            .map_err(|e| anyhow::anyhow!("loading active entries: {}", e))?;
        let n = FeedExporter::new(&cli.feed_origin, key)
            .export_to_file(&entries, path).await?;
        info!("exported {} blocklist entries to {}", n, path.display());
        return Ok(());
    }

    if let Some(ref path) = cli.import_blocklist {
        let entries = FeedImporter::new(key).parse_file(path).await?;
        let mut imported = 0usize;
        for feed_entry in &entries {
            let entry = feed_entry.record.clone().into_entry(&feed_entry.origin);
            match store.add(&entry).await {
                Ok(())  => imported += 1,
                Err(e) => warn!("import of {} failed: {}", entry.value_hash, e),
            }
        }
        info!("imported {} of {} feed entries from {}", imported, entries.len(), path.display());
    }
    Ok(())
}
