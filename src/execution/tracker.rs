use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use super::dead_asset::{DeadAssetConfig, DeathCause};
use super::executor::RetryingExecutor;
use super::portfolio::Portfolio;
use super::price_feed::MarketDataFeed;
use super::retry::{with_retry, RetryConfig};
use super::History;
use crate::error::EngineError;
use crate::indicators::volatility_measure;
use crate::models::{AssetId, Position, SignalAction, Trade, TradeSide};
use crate::performance::{compute_metrics, suggest_adjustments, AdjustmentRules, PerformanceMetrics};
use crate::risk::{RiskManager, RiskOverride, RiskParameters};
use crate::strategy::{ParameterAdjustment, Strategy, StrategyParameters};
use crate::telemetry::Telemetry;

/// Smallest history a tracker keeps regardless of strategy needs
pub const MIN_HISTORY: usize = 24;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub poll_interval_secs: u64,
    /// Wall-clock budget after which the tracker closes out and stops
    pub tracking_budget_secs: u64,
    pub feed_timeout_ms: u64,
    pub order_timeout_ms: u64,
    /// Hard limit for the closing attempt after shutdown is requested
    pub shutdown_deadline_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            tracking_budget_secs: 24 * 3600,
            feed_timeout_ms: 10_000,
            order_timeout_ms: 15_000,
            shutdown_deadline_secs: 30,
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn tracking_budget(&self) -> Duration {
        Duration::from_secs(self.tracking_budget_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_timeout_ms)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    Watching,
    Positioned,
    Dead,
    Closed,
}

impl TrackerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackerState::Dead | TrackerState::Closed)
    }
}

impl std::fmt::Display for TrackerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrackerState::Watching => "watching",
            TrackerState::Positioned => "positioned",
            TrackerState::Dead => "dead",
            TrackerState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Why a tracker stopped
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Dead(DeathCause),
    BudgetElapsed,
    Shutdown,
}

/// Final account of one tracker
#[derive(Debug, Clone, Serialize)]
pub struct TrackerReport {
    pub asset: AssetId,
    pub strategy: String,
    pub state: TrackerState,
    pub termination: Termination,
    pub cycles: u64,
    pub trades: Vec<Trade>,
    pub metrics: PerformanceMetrics,
    pub final_params: StrategyParameters,
    pub adjustments: Vec<ParameterAdjustment>,
    /// Position still held because the closing order failed
    pub open_position: Option<Position>,
    /// The closing attempt after shutdown missed its deadline
    pub incomplete_shutdown: bool,
}

/// Shared collaborators and settings handed to every tracker
#[derive(Clone)]
pub struct TrackerContext {
    pub feed: Arc<dyn MarketDataFeed>,
    pub executor: Arc<RetryingExecutor>,
    pub portfolio: Arc<Portfolio>,
    pub risk: watch::Receiver<RiskParameters>,
    pub retry: RetryConfig,
    pub telemetry: Telemetry,
    pub tracker: TrackerConfig,
    pub dead_asset: DeadAssetConfig,
    pub adjustments: AdjustmentRules,
}

/// Drives one asset through Watching -> Positioned -> Dead | Closed
pub struct PositionTracker {
    asset: AssetId,
    strategy: Box<dyn Strategy>,
    ctx: TrackerContext,
    risk_override: Option<RiskOverride>,
    history: History,
    state: TrackerState,
    position: Option<Position>,
    trades: Vec<Trade>,
    adjustments: Vec<ParameterAdjustment>,
    started: Instant,
    last_sample_at: Instant,
    cycles: u64,
    incomplete: bool,
}

impl PositionTracker {
    pub fn new(
        asset: impl Into<AssetId>,
        strategy: Box<dyn Strategy>,
        ctx: TrackerContext,
        risk_override: Option<RiskOverride>,
    ) -> Self {
        let volatility_period = ctx.risk.borrow().volatility_period;
        let capacity = (strategy.lookback() + 1).max(volatility_period + 1) + ctx.dead_asset.window;
        let now = Instant::now();

        Self {
            asset: asset.into(),
            strategy,
            history: History::new(capacity.max(MIN_HISTORY)),
            ctx,
            risk_override,
            state: TrackerState::Watching,
            position: None,
            trades: Vec::new(),
            adjustments: Vec::new(),
            started: now,
            last_sample_at: now,
            cycles: 0,
            incomplete: false,
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn adjustments(&self) -> &[ParameterAdjustment] {
        &self.adjustments
    }

    /// Poll until the asset dies, the budget runs out or shutdown is requested.
    ///
    /// Only an invariant violation ends the run with an error.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::result::Result<TrackerReport, EngineError> {
        // The budget counts from the first cycle, not from construction
        self.started = Instant::now();
        self.last_sample_at = self.started;

        tracing::info!(
            asset = %self.asset,
            strategy = %self.strategy.name(),
            lookback = self.strategy.lookback(),
            feed = %self.ctx.feed.name(),
            "Tracker started"
        );

        let termination = loop {
            if *shutdown.borrow() {
                break self.close_for_shutdown().await;
            }

            if self.started.elapsed() >= self.ctx.tracker.tracking_budget() {
                self.force_close("tracking budget elapsed").await;
                self.transition(TrackerState::Closed);
                break Termination::BudgetElapsed;
            }

            if let Some(termination) = self.cycle().await? {
                break termination;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.ctx.tracker.poll_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Orchestrator gone; nothing will ever resume us
                        break self.close_for_shutdown().await;
                    }
                }
            }
        };

        Ok(self.into_report(termination))
    }

    /// One polling cycle. Returns the termination reason once terminal.
    pub async fn cycle(&mut self) -> std::result::Result<Option<Termination>, EngineError> {
        self.cycles += 1;
        self.pull().await;

        let idle = self.last_sample_at.elapsed();
        if let Some(cause) = self.ctx.dead_asset.check(idle, &self.history) {
            tracing::warn!(
                asset = %self.asset,
                cause = %cause,
                idle_secs = idle.as_secs(),
                "🪦 Asset is dead"
            );
            self.force_close(&format!("asset {}", cause)).await;
            self.transition(TrackerState::Dead);
            self.ctx
                .telemetry
                .notify(format!("Tracker for {} died ({})", self.asset, cause));
            return Ok(Some(Termination::Dead(cause)));
        }

        if self.history.is_empty() {
            tracing::debug!(asset = %self.asset, "No history yet, skipping decision");
            return Ok(None);
        }

        let signal = self.strategy.evaluate(&self.history, self.position.as_ref());
        match signal.resolve(self.position.is_some()) {
            SignalAction::Buy => self.enter().await?,
            SignalAction::Sell => {
                if self.exit().await? && self.started.elapsed() >= self.ctx.tracker.tracking_budget() {
                    self.transition(TrackerState::Closed);
                    return Ok(Some(Termination::BudgetElapsed));
                }
            }
            SignalAction::Hold => {}
        }

        Ok(None)
    }

    async fn pull(&mut self) {
        let feed = &self.ctx.feed;
        let asset = self.asset.as_str();
        let pulled = with_retry(
            &self.ctx.retry,
            "feed_pull",
            self.ctx.tracker.feed_timeout(),
            move || feed.pull(asset),
        )
        .await;

        match pulled {
            Ok(Some(sample)) => {
                let close = sample.close;
                if self.history.push(sample) {
                    self.last_sample_at = Instant::now();
                    self.ctx.portfolio.record_price(&self.asset, close);
                    tracing::debug!(asset = %self.asset, price = %close, "New sample");
                } else {
                    tracing::debug!(asset = %self.asset, "No new sample");
                }
            }
            Ok(None) => tracing::debug!(asset = %self.asset, "Feed had no sample"),
            Err(e) => tracing::warn!(asset = %self.asset, "Feed pull failed: {}", e),
        }
    }

    /// Consistent snapshot of the risk policy for this cycle
    fn risk_snapshot(&self) -> RiskParameters {
        let base = self.ctx.risk.borrow().clone();
        match &self.risk_override {
            Some(over) => over.apply(&base),
            None => base,
        }
    }

    async fn enter(&mut self) -> std::result::Result<(), EngineError> {
        if self.position.is_some() || self.state != TrackerState::Watching {
            return Err(EngineError::invariant(
                self.asset.clone(),
                "entry attempted while a position is open",
            ));
        }
        let Some(price) = self.history.last_close() else {
            return Ok(());
        };

        let manager = RiskManager::new(self.risk_snapshot());
        let volatility = volatility_measure(self.history.as_slice(), manager.params().volatility_period);
        let cash = self.ctx.portfolio.available_cash();

        let sized = manager.size_position(cash, volatility);
        let affordable = manager.affordable_quantity(cash, price);
        if affordable <= 0.0 {
            tracing::warn!(asset = %self.asset, cash = %cash, "Cannot afford entry, skipping");
            return Ok(());
        }
        let quantity = sized.min(affordable);
        let protective_exit = manager.protective_exit(price, volatility);

        // Held until the fill settles so concurrent entries size from what is left
        let reservation = match self.ctx.portfolio.reserve(&self.asset, quantity * price) {
            Ok(reservation) => reservation,
            Err(e) => {
                tracing::warn!(asset = %self.asset, "Cannot reserve cash for entry, skipping: {}", e);
                return Ok(());
            }
        };

        tracing::info!(
            asset = %self.asset,
            price = %price,
            quantity = %quantity,
            volatility = %volatility,
            protective_exit = %protective_exit,
            "📈 Buy signal"
        );

        let order_id = match self
            .ctx
            .executor
            .place(&self.asset, TradeSide::Buy, quantity, Some(protective_exit))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(asset = %self.asset, "Entry order failed: {}", e);
                self.ctx.portfolio.release(reservation);
                return Ok(());
            }
        };

        self.ctx
            .portfolio
            .commit(reservation, quantity, price)
            .map_err(|e| EngineError::invariant(self.asset.clone(), format!("ledger rejected fill: {}", e)))?;

        let now = Utc::now();
        self.position = Some(Position {
            id: Uuid::new_v4(),
            asset: self.asset.clone(),
            entry_price: price,
            quantity,
            entry_time: now,
            protective_exit,
        });
        self.record_trade(Trade::new(&*self.asset, TradeSide::Buy, price, quantity, now).with_order_id(order_id));
        self.transition(TrackerState::Positioned);
        self.ctx.telemetry.notify(format!(
            "Opened {} position: {:.4} @ {:.6} (exit below {:.6})",
            self.asset, quantity, price, protective_exit
        ));

        Ok(())
    }

    /// Sell the whole position at the last price. Returns true once closed.
    async fn exit(&mut self) -> std::result::Result<bool, EngineError> {
        let Some(price) = self.history.last_close() else {
            return Ok(false);
        };

        if !self.sell_position(price, "sell signal").await? {
            return Ok(false);
        }

        self.transition(TrackerState::Watching);
        self.apply_feedback();
        Ok(true)
    }

    /// Place the sell and settle the ledger; false when the order failed
    async fn sell_position(&mut self, price: f64, reason: &str) -> std::result::Result<bool, EngineError> {
        let Some(position) = self.position.clone() else {
            return Ok(false);
        };

        let order_id = match self
            .ctx
            .executor
            .place(&self.asset, TradeSide::Sell, position.quantity, None)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(asset = %self.asset, reason, "Exit order failed: {}", e);
                return Ok(false);
            }
        };

        self.ctx
            .portfolio
            .apply_trade(&self.asset, -position.quantity, price)
            .map_err(|e| EngineError::invariant(self.asset.clone(), format!("ledger rejected fill: {}", e)))?;

        let pnl = position.unrealized_pnl(price);
        self.position = None;
        self.record_trade(
            Trade::new(&*self.asset, TradeSide::Sell, price, position.quantity, Utc::now())
                .with_order_id(order_id),
        );

        tracing::info!(
            asset = %self.asset,
            price = %price,
            entry = %position.entry_price,
            pnl = %format!("{:.4}", pnl),
            reason,
            "📉 Position closed"
        );
        self.ctx.telemetry.notify(format!(
            "Closed {} position @ {:.6} ({}), P&L {:+.4}",
            self.asset, price, reason, pnl
        ));

        Ok(true)
    }

    /// Close any open position at the last known price. A failed order leaves
    /// the position in place for the report.
    async fn force_close(&mut self, reason: &str) {
        let Some(position) = &self.position else {
            return;
        };
        let price = self.history.last_close().unwrap_or(position.entry_price);

        match self.sell_position(price, reason).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::error!(asset = %self.asset, reason, "Forced close failed, position left open");
            }
            Err(e) => {
                tracing::error!(asset = %self.asset, "Forced close rejected by ledger: {}", e);
            }
        }
    }

    async fn close_for_shutdown(&mut self) -> Termination {
        tracing::info!(asset = %self.asset, "Shutdown requested");

        let deadline = self.ctx.tracker.shutdown_deadline();
        if tokio::time::timeout(deadline, self.force_close("shutdown"))
            .await
            .is_err()
        {
            tracing::error!(
                asset = %self.asset,
                deadline_secs = deadline.as_secs(),
                "Shutdown close missed its deadline"
            );
            self.incomplete = true;
        }

        self.transition(TrackerState::Closed);
        Termination::Shutdown
    }

    /// Feed realized performance back into the strategy
    fn apply_feedback(&mut self) {
        let metrics = compute_metrics(&self.trades, self.started.elapsed());
        for adjustment in suggest_adjustments(&metrics, &self.ctx.adjustments) {
            if self.strategy.apply_adjustment(&adjustment) {
                tracing::info!(
                    asset = %self.asset,
                    adjustment = %adjustment,
                    win_rate = %metrics.win_rate,
                    "Strategy parameters adjusted"
                );
                self.ctx
                    .telemetry
                    .notify(format!("{}: {}", self.asset, adjustment));
                self.adjustments.push(adjustment);
            }
        }
    }

    fn record_trade(&mut self, trade: Trade) {
        self.ctx.telemetry.trade(&trade);
        self.trades.push(trade);
    }

    fn transition(&mut self, next: TrackerState) {
        if self.state != next {
            tracing::info!(asset = %self.asset, from = %self.state, to = %next, "State change");
            self.state = next;
        }
    }

    fn into_report(self, termination: Termination) -> TrackerReport {
        let metrics = compute_metrics(&self.trades, self.started.elapsed());

        tracing::info!(
            asset = %self.asset,
            state = %self.state,
            cycles = self.cycles,
            trades = self.trades.len(),
            realized_profit = %format!("{:.4}", metrics.realized_profit),
            "Tracker finished"
        );

        TrackerReport {
            asset: self.asset,
            strategy: self.strategy.name().to_string(),
            state: self.state,
            termination,
            cycles: self.cycles,
            metrics,
            final_params: self.strategy.params().clone(),
            trades: self.trades,
            adjustments: self.adjustments,
            open_position: self.position,
            incomplete_shutdown: self.incomplete,
        }
    }
}
