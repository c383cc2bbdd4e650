//! Runs one [`PositionTracker`] per asset under a concurrency bound.
//!
//! The orchestrator owns the shutdown signal and the hot-reloadable risk
//! parameters, emits periodic valuation ticks and collects every tracker's
//! report. Assets can be added while it runs through an [`OrchestratorHandle`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::EngineError;
use crate::execution::{PositionTracker, TrackerContext, TrackerReport};
use crate::models::AssetId;
use crate::persistence::ValuationTick;
use crate::risk::{RiskOverride, RiskParameters};
use crate::strategy::StrategyConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_concurrent_trackers: usize,
    pub valuation_interval_secs: u64,
    /// Pause after a fault in the supervising loop
    pub error_cooldown_secs: u64,
    /// Trackers still running this long after shutdown are aborted
    pub shutdown_deadline_secs: u64,
    /// Keep running with no trackers, waiting for new assets
    pub keep_alive: bool,
    pub command_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_trackers: 8,
            valuation_interval_secs: 300,
            error_cooldown_secs: 30,
            shutdown_deadline_secs: 60,
            keep_alive: false,
            command_buffer: 64,
        }
    }
}

/// What to track and how
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetSpec {
    pub asset: AssetId,
    pub strategy: StrategyConfig,
    pub risk: Option<RiskOverride>,
}

impl AssetSpec {
    pub fn new(asset: impl Into<AssetId>, strategy: StrategyConfig) -> Self {
        Self {
            asset: asset.into(),
            strategy,
            risk: None,
        }
    }

    pub fn with_risk(mut self, risk: RiskOverride) -> Self {
        self.risk = Some(risk);
        self
    }
}

#[derive(Debug)]
enum Command {
    Watch(AssetSpec),
    UpdateRisk(RiskParameters),
    Shutdown,
}

/// Cloneable remote control for a running orchestrator
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
}

impl OrchestratorHandle {
    /// Start tracking an asset; ignored if it is already tracked
    pub async fn watch_asset(&self, spec: AssetSpec) -> crate::Result<()> {
        self.send(Command::Watch(spec)).await
    }

    /// Replace the process-wide risk parameters; trackers pick them up next cycle
    pub async fn update_risk(&self, params: RiskParameters) -> crate::Result<()> {
        self.send(Command::UpdateRisk(params)).await
    }

    pub async fn shutdown(&self) -> crate::Result<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> crate::Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| "orchestrator is no longer running".into())
    }
}

/// Everything the orchestrator learned by the time it stopped
#[derive(Debug, Default, Serialize)]
pub struct OrchestratorReport {
    pub trackers: Vec<TrackerReport>,
    /// Trackers that ended with an invariant violation
    pub aborted: Vec<(AssetId, String)>,
    /// Assets whose tracker never reported (panicked or hard-aborted)
    pub incomplete: Vec<AssetId>,
    pub cash: f64,
    pub equity: f64,
}

type TrackerOutcome = (AssetId, std::result::Result<TrackerReport, EngineError>);

pub struct Orchestrator {
    config: OrchestratorConfig,
    ctx: TrackerContext,
    risk_tx: watch::Sender<RiskParameters>,
    shutdown_tx: watch::Sender<bool>,
    commands: mpsc::Receiver<Command>,
    handle: OrchestratorHandle,
}

impl Orchestrator {
    /// `risk_tx` must be the sender paired with `ctx.risk`
    pub fn new(
        config: OrchestratorConfig,
        ctx: TrackerContext,
        risk_tx: watch::Sender<RiskParameters>,
    ) -> Self {
        let (tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            ctx,
            risk_tx,
            shutdown_tx,
            commands,
            handle: OrchestratorHandle { tx },
        }
    }

    pub fn handle(&self) -> OrchestratorHandle {
        self.handle.clone()
    }

    pub async fn run(self, initial: Vec<AssetSpec>) -> OrchestratorReport {
        let Orchestrator {
            config,
            ctx,
            risk_tx,
            shutdown_tx,
            mut commands,
            handle,
        } = self;
        // Only external handles keep the command channel open
        drop(handle);

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_trackers.max(1)));
        let mut trackers: JoinSet<TrackerOutcome> = JoinSet::new();
        // Task id -> asset for every tracker not yet collected
        let mut running: HashMap<Id, AssetId> = HashMap::new();
        let mut started: HashSet<AssetId> = HashSet::new();
        let mut report = OrchestratorReport::default();

        tracing::info!(
            assets = initial.len(),
            max_concurrent = config.max_concurrent_trackers,
            "🚀 Orchestrator starting"
        );

        for spec in initial {
            spawn_tracker(&mut trackers, &mut running, &mut started, &semaphore, &ctx, &shutdown_tx, spec);
        }

        let mut valuation = tokio::time::interval(Duration::from_secs(
            config.valuation_interval_secs.max(1),
        ));
        valuation.set_missed_tick_behavior(MissedTickBehavior::Skip);
        valuation.tick().await;

        let mut commands_open = true;
        // After a fault only commands are served until this passes
        let mut cooling_until: Option<Instant> = None;

        loop {
            if trackers.is_empty() && (!config.keep_alive || !commands_open) {
                tracing::info!("No trackers left, stopping");
                break;
            }

            let step: anyhow::Result<bool> = tokio::select! {
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Watch(spec)) => {
                        spawn_tracker(&mut trackers, &mut running, &mut started, &semaphore, &ctx, &shutdown_tx, spec);
                        Ok(true)
                    }
                    Some(Command::UpdateRisk(params)) => {
                        let problems = params.problems();
                        if problems.is_empty() {
                            tracing::info!(?params, "Risk parameters updated");
                            risk_tx.send_replace(params);
                            Ok(true)
                        } else {
                            Err(anyhow!("rejected risk update: {}", problems.join(", ")))
                        }
                    }
                    Some(Command::Shutdown) => Ok(false),
                    None => {
                        commands_open = false;
                        Ok(true)
                    }
                },
                _ = tokio::time::sleep_until(cooling_until.unwrap_or_else(Instant::now)), if cooling_until.is_some() => {
                    tracing::info!("Cooldown over, resuming");
                    cooling_until = None;
                    Ok(true)
                }
                Some(joined) = trackers.join_next_with_id(), if !trackers.is_empty() && cooling_until.is_none() => {
                    collect(joined, &mut running, &mut report, &ctx)
                }
                _ = valuation.tick(), if cooling_until.is_none() => emit_valuation(&ctx, running.len()),
            };

            match step {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::error!("Orchestrator fault: {:#}", e);
                    ctx.telemetry.notify(format!("⚠️ Orchestrator fault: {}", e));
                    cooling_until = Some(Instant::now() + Duration::from_secs(config.error_cooldown_secs));
                }
            }
        }

        shutdown_trackers(&config, &shutdown_tx, &mut trackers, &mut running, &mut report, &ctx).await;

        report.incomplete = started
            .into_iter()
            .filter(|asset| {
                !report.trackers.iter().any(|r| &r.asset == asset)
                    && !report.aborted.iter().any(|(a, _)| a == asset)
            })
            .collect();
        report.incomplete.sort();

        let snapshot = ctx.portfolio.snapshot();
        report.cash = snapshot.cash;
        report.equity = snapshot.equity();
        if let Err(e) = emit_valuation(&ctx, 0) {
            tracing::warn!("Final valuation skipped: {}", e);
        }

        tracing::info!(
            trackers = report.trackers.len(),
            aborted = report.aborted.len(),
            incomplete = report.incomplete.len(),
            equity = %format!("{:.2}", report.equity),
            "🏁 Orchestrator stopped"
        );

        report
    }
}

fn spawn_tracker(
    trackers: &mut JoinSet<TrackerOutcome>,
    running: &mut HashMap<Id, AssetId>,
    started: &mut HashSet<AssetId>,
    semaphore: &Arc<Semaphore>,
    ctx: &TrackerContext,
    shutdown_tx: &watch::Sender<bool>,
    spec: AssetSpec,
) {
    if running.values().any(|asset| asset == &spec.asset) {
        tracing::info!(asset = %spec.asset, "Already tracked, ignoring");
        return;
    }
    if *shutdown_tx.borrow() {
        tracing::warn!(asset = %spec.asset, "Shutting down, not starting tracker");
        return;
    }

    started.insert(spec.asset.clone());

    let semaphore = semaphore.clone();
    let mut shutdown = shutdown_tx.subscribe();
    let tracker = PositionTracker::new(spec.asset.clone(), spec.strategy.build(), ctx.clone(), spec.risk);
    let asset = spec.asset;
    let tracked = asset.clone();

    let task = trackers.spawn(async move {
        // Wait for a slot; shutdown while queued still produces a report
        let _permit = tokio::select! {
            permit = semaphore.acquire_owned() => permit.ok(),
            _ = shutdown.wait_for(|stop| *stop) => None,
        };
        let result = tracker.run(shutdown).await;
        (asset, result)
    });
    running.insert(task.id(), tracked);
}

fn collect(
    joined: std::result::Result<(Id, TrackerOutcome), JoinError>,
    running: &mut HashMap<Id, AssetId>,
    report: &mut OrchestratorReport,
    ctx: &TrackerContext,
) -> anyhow::Result<bool> {
    let (id, (asset, result)) = match joined {
        Ok(joined) => joined,
        Err(e) => {
            let asset = running.remove(&e.id());
            return Err(anyhow!(
                "tracker task for {} failed: {}",
                asset.as_deref().unwrap_or("unknown asset"),
                e
            ));
        }
    };
    running.remove(&id);

    match result {
        Ok(tracker_report) => {
            tracing::info!(
                asset = %asset,
                state = %tracker_report.state,
                trades = tracker_report.trades.len(),
                "Tracker reported"
            );
            report.trackers.push(tracker_report);
        }
        Err(e) => {
            tracing::error!(asset = %asset, "Tracker aborted: {}", e);
            ctx.telemetry.notify(format!("Tracker for {} aborted: {}", asset, e));
            report.aborted.push((asset, e.to_string()));
        }
    }

    Ok(true)
}

fn emit_valuation(ctx: &TrackerContext, running: usize) -> anyhow::Result<bool> {
    let snapshot = ctx.portfolio.snapshot();
    let equity = snapshot.equity();
    if !equity.is_finite() {
        return Err(anyhow!("portfolio valuation is not finite: {}", equity));
    }

    tracing::info!(
        cash = %format!("{:.2}", snapshot.cash),
        equity = %format!("{:.2}", equity),
        open_positions = snapshot.holdings.len(),
        trackers = running,
        "💼 Portfolio valuation"
    );

    ctx.telemetry.valuation(ValuationTick {
        timestamp: Utc::now(),
        cash: snapshot.cash,
        equity,
        open_positions: snapshot.holdings.len(),
    });

    Ok(true)
}

async fn shutdown_trackers(
    config: &OrchestratorConfig,
    shutdown_tx: &watch::Sender<bool>,
    trackers: &mut JoinSet<TrackerOutcome>,
    running: &mut HashMap<Id, AssetId>,
    report: &mut OrchestratorReport,
    ctx: &TrackerContext,
) {
    shutdown_tx.send_replace(true);
    if trackers.is_empty() {
        return;
    }

    tracing::info!(trackers = trackers.len(), "Waiting for trackers to close");
    let deadline = Duration::from_secs(config.shutdown_deadline_secs);

    let drained = tokio::time::timeout(deadline, async {
        while let Some(joined) = trackers.join_next_with_id().await {
            if let Err(e) = collect(joined, running, report, ctx) {
                tracing::error!("{:#}", e);
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::error!(
            remaining = trackers.len(),
            "Shutdown deadline passed, aborting trackers"
        );
        trackers.abort_all();
        while trackers.join_next().await.is_some() {}
    }
}
