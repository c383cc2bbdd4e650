use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;

use tokentracker::api::DexScreenerFeed;
use tokentracker::execution::{
    OrderExecutor, PaperExecutor, Portfolio, RetryingExecutor, TrackerContext,
};
use tokentracker::notify::{LogNotifier, NotificationSink, TelegramNotifier};
use tokentracker::persistence::{PersistenceSink, RedisSink, TracingSink};
use tokentracker::settings::{EngineConfig, DEFAULT_CONFIG_PATH};
use tokentracker::strategy::StrategyConfig;
use tokentracker::{telemetry, Orchestrator, OrchestratorReport, Result};

/// Watch assets, trade them on signal and tune the strategy from results
#[derive(Debug, Parser)]
#[command(name = "tokentracker", version)]
struct Cli {
    /// Asset to watch (mint address); repeatable
    #[arg(short, long = "asset")]
    assets: Vec<String>,

    /// Strategy for assets without their own: momentum, crossover, oscillator, vote
    #[arg(short, long)]
    strategy: Option<String>,

    /// Tracking budget per asset, in hours
    #[arg(long)]
    track_hours: Option<u64>,

    /// Maximum number of trackers running at once
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let mut config = EngineConfig::load(&config_path, cli.config.is_some())?;
    apply_cli(&mut config, &cli)?;
    config.validate()?;

    let specs = config.asset_specs(&cli.assets);
    if specs.is_empty() && !config.orchestrator.keep_alive {
        return Err("No assets to watch. Pass --asset or list [[assets]] in the config.".into());
    }

    tracing::info!("🚀 tokentracker starting");
    tracing::info!("  Capital: ${:.2}", config.initial_capital);
    tracing::info!("  Poll interval: {}s", config.tracker.poll_interval_secs);
    tracing::info!("  Tracking budget: {}h", config.tracker.tracking_budget_secs / 3600);
    tracing::info!("  Max concurrent trackers: {}", config.orchestrator.max_concurrent_trackers);
    for spec in &specs {
        tracing::info!("    - {}", spec.asset);
    }

    let persistence = connect_persistence(&config).await;
    let notifier: Arc<dyn NotificationSink> = match config.notifications.telegram() {
        Some((token, chat_id)) => {
            tracing::info!("Telegram alerts enabled");
            Arc::new(TelegramNotifier::new(token, chat_id))
        }
        None => Arc::new(LogNotifier),
    };
    let (telemetry, workers) =
        telemetry::spawn(persistence, notifier, config.persistence.queue_capacity);

    let paper: Arc<dyn OrderExecutor> = Arc::new(PaperExecutor::new());
    let executor = Arc::new(RetryingExecutor::new(
        paper,
        config.retry.clone(),
        config.tracker.order_timeout(),
    ));

    let (risk_tx, risk_rx) = watch::channel(config.risk.clone());
    let ctx = TrackerContext {
        feed: Arc::new(DexScreenerFeed::new(config.feed.clone())?),
        executor,
        portfolio: Arc::new(Portfolio::new(config.initial_capital)),
        risk: risk_rx,
        retry: config.retry.clone(),
        telemetry: telemetry.clone(),
        tracker: config.tracker.clone(),
        dead_asset: config.dead_asset.clone(),
        adjustments: config.adjustments.clone(),
    };

    let orchestrator = Orchestrator::new(config.orchestrator.clone(), ctx, risk_tx);
    let handle = orchestrator.handle();
    let mut run = tokio::spawn(orchestrator.run(specs));

    let report = tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
            if let Err(e) = handle.shutdown().await {
                tracing::warn!("Shutdown request not delivered: {}", e);
            }
            run.await?
        }
    };

    log_summary(&report);

    // Let the writers flush what the trackers queued
    drop(telemetry);
    drop(handle);
    if tokio::time::timeout(Duration::from_secs(10), workers.join())
        .await
        .is_err()
    {
        tracing::warn!("Telemetry writers did not finish in time");
    }

    tracing::info!("👋 tokentracker stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tokentracker=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn apply_cli(config: &mut EngineConfig, cli: &Cli) -> Result<()> {
    if let Some(name) = &cli.strategy {
        config.strategy = StrategyConfig::named(name)
            .ok_or_else(|| format!("Unknown strategy '{}'", name))?;
    }
    if let Some(hours) = cli.track_hours {
        config.tracker.tracking_budget_secs = hours.saturating_mul(3600);
    }
    if let Some(max) = cli.max_concurrent {
        config.orchestrator.max_concurrent_trackers = max;
    }
    Ok(())
}

async fn connect_persistence(config: &EngineConfig) -> Arc<dyn PersistenceSink> {
    let Some(redis_url) = &config.persistence.redis_url else {
        return Arc::new(TracingSink);
    };

    match RedisSink::connect(redis_url).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Redis ({}), continuing with log-only persistence",
                e
            );
            Arc::new(TracingSink)
        }
    }
}

fn log_summary(report: &OrchestratorReport) {
    tracing::info!("\n📊 Summary:");
    for tracker in &report.trackers {
        tracing::info!(
            "  {} [{}] {:?}: {} trades, win rate {:.0}%, P&L {:+.4}",
            tracker.asset,
            tracker.strategy,
            tracker.termination,
            tracker.trades.len(),
            tracker.metrics.win_rate * 100.0,
            tracker.metrics.realized_profit
        );
        if let Some(position) = &tracker.open_position {
            tracing::warn!(
                "    still holding {:.4} @ {:.6} (close failed)",
                position.quantity,
                position.entry_price
            );
        }
        if tracker.incomplete_shutdown {
            tracing::warn!("    shutdown did not complete in time");
        }
    }
    for (asset, reason) in &report.aborted {
        tracing::error!("  {} aborted: {}", asset, reason);
    }
    for asset in &report.incomplete {
        tracing::error!("  {} never reported", asset);
    }
    tracing::info!("  Cash: ${:.2}", report.cash);
    tracing::info!("  Equity: ${:.2}", report.equity);
}
