//! Non-blocking path from the engine to the persistence and notification sinks.
//!
//! Trackers enqueue with `try_send`; background writers drain the queues. A
//! full queue drops the item with a warning and never stalls a cycle.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::Trade;
use crate::notify::NotificationSink;
use crate::persistence::{EngineRecord, PersistenceSink, ValuationTick};

/// Cloneable sender half handed to every tracker
#[derive(Clone, Default)]
pub struct Telemetry {
    records: Option<mpsc::Sender<EngineRecord>>,
    events: Option<mpsc::Sender<String>>,
}

impl Telemetry {
    /// Telemetry that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn trade(&self, trade: &Trade) {
        self.record(EngineRecord::Trade(trade.clone()));
    }

    pub fn valuation(&self, tick: ValuationTick) {
        self.record(EngineRecord::Valuation(tick));
    }

    pub fn record(&self, record: EngineRecord) {
        if let Some(tx) = &self.records {
            if let Err(e) = tx.try_send(record) {
                tracing::warn!("Dropping persistence record: {}", e);
            }
        }
    }

    pub fn notify(&self, message: impl Into<String>) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(message.into()) {
                tracing::warn!("Dropping notification: {}", e);
            }
        }
    }
}

/// Handles of the background writers; they finish once every sender is dropped
pub struct TelemetryWorkers {
    pub persistence: JoinHandle<()>,
    pub notifications: JoinHandle<()>,
}

impl TelemetryWorkers {
    pub async fn join(self) {
        if let Err(e) = self.persistence.await {
            tracing::error!("Persistence writer panicked: {}", e);
        }
        if let Err(e) = self.notifications.await {
            tracing::error!("Notification writer panicked: {}", e);
        }
    }
}

/// Spawn writers for both sinks with queues of `capacity` entries
pub fn spawn(
    persistence: Arc<dyn PersistenceSink>,
    notifier: Arc<dyn NotificationSink>,
    capacity: usize,
) -> (Telemetry, TelemetryWorkers) {
    let capacity = capacity.max(1);
    let (records_tx, mut records_rx) = mpsc::channel::<EngineRecord>(capacity);
    let (events_tx, mut events_rx) = mpsc::channel::<String>(capacity);

    let persistence = tokio::spawn(async move {
        while let Some(record) = records_rx.recv().await {
            if let Err(e) = persistence.write(&record).await {
                tracing::warn!("Failed to persist record: {}", e);
            }
        }
        tracing::debug!("Persistence writer stopped");
    });

    let notifications = tokio::spawn(async move {
        while let Some(message) = events_rx.recv().await {
            if let Err(e) = notifier.notify(&message).await {
                tracing::warn!("Failed to deliver notification: {}", e);
            }
        }
        tracing::debug!("Notification writer stopped");
    });

    (
        Telemetry {
            records: Some(records_tx),
            events: Some(events_tx),
        },
        TelemetryWorkers {
            persistence,
            notifications,
        },
    )
}
