use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, ensure};
use serde::Serialize;

use crate::models::AssetId;

const DUST: f64 = 1e-9;

/// Point-in-time copy of the ledger
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub holdings: HashMap<AssetId, f64>,
    /// Cash earmarked for entries whose orders are still in flight
    pub reservations: HashMap<AssetId, f64>,
    /// Last price each tracker reported, used for valuation ticks
    pub last_prices: HashMap<AssetId, f64>,
}

impl PortfolioSnapshot {
    /// Cash plus each holding at `prices`.
    ///
    /// A holding without a price is left out of the total and logged.
    pub fn mark_to_market(&self, prices: &HashMap<AssetId, f64>) -> f64 {
        let mut equity = self.cash;

        for (asset, quantity) in &self.holdings {
            match prices.get(asset) {
                Some(price) if price.is_finite() => equity += quantity * price,
                _ => {
                    tracing::warn!(
                        asset = %asset,
                        quantity = %quantity,
                        "No price for holding; excluded from valuation"
                    );
                }
            }
        }

        equity
    }

    /// Valuation at the last reported prices
    pub fn equity(&self) -> f64 {
        self.mark_to_market(&self.last_prices)
    }

    /// Cash not held by any reservation
    pub fn available_cash(&self) -> f64 {
        self.cash - self.reservations.values().sum::<f64>()
    }

    fn apply(&mut self, asset: &str, quantity_delta: f64, price: f64) -> anyhow::Result<()> {
        ensure!(
            quantity_delta.is_finite() && price.is_finite() && price > 0.0,
            "invalid trade for {}: delta {} at {}",
            asset,
            quantity_delta,
            price
        );

        let held = self.holdings.get(asset).copied().unwrap_or(0.0);
        let cost = quantity_delta * price;
        let available = self.available_cash();

        if quantity_delta < 0.0 && -quantity_delta > held + DUST {
            bail!(
                "cannot sell {} {}: only {} held",
                -quantity_delta,
                asset,
                held
            );
        }
        if cost > available + DUST {
            bail!(
                "insufficient cash for {}: need {:.2}, have {:.2}",
                asset,
                cost,
                available
            );
        }

        self.cash -= cost;
        let remaining = held + quantity_delta;
        if remaining.abs() <= DUST {
            self.holdings.remove(asset);
        } else {
            self.holdings.insert(asset.to_string(), remaining);
        }
        self.last_prices.insert(asset.to_string(), price);

        Ok(())
    }
}

/// Cash set aside for one pending entry.
///
/// Hand it back through [`Portfolio::commit`] once the order fills or
/// [`Portfolio::release`] when it fails.
#[derive(Debug)]
#[must_use = "a reservation holds cash until committed or released"]
pub struct Reservation {
    asset: AssetId,
    amount: f64,
}

impl Reservation {
    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }
}

/// Authoritative cash and holdings ledger shared by every tracker
#[derive(Debug)]
pub struct Portfolio {
    inner: Mutex<PortfolioSnapshot>,
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            inner: Mutex::new(PortfolioSnapshot {
                cash: initial_cash,
                ..Default::default()
            }),
        }
    }

    /// Apply an executed trade: `cash -= quantity_delta * price`.
    ///
    /// Negative deltas are sells. Buys draw on unreserved cash only. The
    /// update is all-or-nothing.
    pub fn apply_trade(&self, asset: &str, quantity_delta: f64, price: f64) -> anyhow::Result<()> {
        self.inner.lock().unwrap().apply(asset, quantity_delta, price)
    }

    /// Set `cost` aside from available cash for an entry in `asset`
    pub fn reserve(&self, asset: &str, cost: f64) -> anyhow::Result<Reservation> {
        ensure!(cost.is_finite() && cost > 0.0, "invalid reservation for {}: {}", asset, cost);

        let mut ledger = self.inner.lock().unwrap();
        ensure!(
            !ledger.reservations.contains_key(asset),
            "{} already has an entry in flight",
            asset
        );
        let available = ledger.available_cash();
        if cost > available + DUST {
            bail!(
                "insufficient cash to reserve for {}: need {:.2}, have {:.2}",
                asset,
                cost,
                available
            );
        }

        ledger.reservations.insert(asset.to_string(), cost);
        Ok(Reservation {
            asset: asset.to_string(),
            amount: cost,
        })
    }

    /// Settle a filled entry against its reservation
    pub fn commit(&self, reservation: Reservation, quantity: f64, price: f64) -> anyhow::Result<()> {
        let mut ledger = self.inner.lock().unwrap();
        ledger.reservations.remove(&reservation.asset);
        ledger.apply(&reservation.asset, quantity, price)
    }

    /// Return reserved cash after a failed entry
    pub fn release(&self, reservation: Reservation) {
        self.inner
            .lock()
            .unwrap()
            .reservations
            .remove(&reservation.asset);
    }

    /// Record the latest observed price for valuation ticks
    pub fn record_price(&self, asset: &str, price: f64) {
        if price.is_finite() {
            self.inner
                .lock()
                .unwrap()
                .last_prices
                .insert(asset.to_string(), price);
        }
    }

    pub fn cash(&self) -> f64 {
        self.inner.lock().unwrap().cash
    }

    pub fn available_cash(&self) -> f64 {
        self.inner.lock().unwrap().available_cash()
    }

    pub fn holding(&self, asset: &str) -> f64 {
        self.inner
            .lock()
            .unwrap()
            .holdings
            .get(asset)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        self.inner.lock().unwrap().clone()
    }

    pub fn mark_to_market(&self, prices: &HashMap<AssetId, f64>) -> f64 {
        self.snapshot().mark_to_market(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(pairs: &[(&str, f64)]) -> HashMap<AssetId, f64> {
        pairs.iter().map(|(a, p)| (a.to_string(), *p)).collect()
    }

    #[test]
    fn test_buy_then_mark_at_same_price_keeps_equity() {
        let portfolio = Portfolio::new(10_000.0);
        portfolio.apply_trade("SOL", 5.0, 100.0).unwrap();

        assert_eq!(portfolio.cash(), 9_500.0);
        assert_eq!(portfolio.mark_to_market(&prices(&[("SOL", 100.0)])), 10_000.0);
    }

    #[test]
    fn test_round_trip_realizes_profit() {
        let portfolio = Portfolio::new(1_000.0);
        portfolio.apply_trade("SOL", 2.0, 100.0).unwrap();
        portfolio.apply_trade("SOL", -2.0, 110.0).unwrap();

        assert_eq!(portfolio.cash(), 1_020.0);
        assert_eq!(portfolio.holding("SOL"), 0.0);
        assert!(portfolio.snapshot().holdings.is_empty());
    }

    #[test]
    fn test_missing_price_excluded() {
        let portfolio = Portfolio::new(1_000.0);
        portfolio.apply_trade("SOL", 1.0, 100.0).unwrap();
        portfolio.apply_trade("BONK", 10.0, 1.0).unwrap();

        let equity = portfolio.mark_to_market(&prices(&[("SOL", 120.0)]));
        assert_eq!(equity, 890.0 + 120.0);
    }

    #[test]
    fn test_oversell_rejected_and_ledger_unchanged() {
        let portfolio = Portfolio::new(1_000.0);
        portfolio.apply_trade("SOL", 1.0, 100.0).unwrap();

        assert!(portfolio.apply_trade("SOL", -2.0, 100.0).is_err());
        assert_eq!(portfolio.cash(), 900.0);
        assert_eq!(portfolio.holding("SOL"), 1.0);
    }

    #[test]
    fn test_overspend_rejected() {
        let portfolio = Portfolio::new(100.0);
        assert!(portfolio.apply_trade("SOL", 2.0, 100.0).is_err());
        assert_eq!(portfolio.cash(), 100.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        let portfolio = Portfolio::new(100.0);
        assert!(portfolio.apply_trade("SOL", f64::NAN, 1.0).is_err());
        assert!(portfolio.apply_trade("SOL", 1.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_reservation_holds_cash_until_settled() {
        let portfolio = Portfolio::new(1_000.0);
        let reservation = portfolio.reserve("SOL", 600.0).unwrap();

        assert_eq!(portfolio.cash(), 1_000.0);
        assert_eq!(portfolio.available_cash(), 400.0);
        assert!(portfolio.reserve("BONK", 500.0).is_err());
        assert!(portfolio.apply_trade("BONK", 5.0, 100.0).is_err());
        assert!(portfolio.reserve("SOL", 10.0).is_err());

        portfolio.commit(reservation, 6.0, 100.0).unwrap();
        assert_eq!(portfolio.cash(), 400.0);
        assert_eq!(portfolio.available_cash(), 400.0);
        assert_eq!(portfolio.holding("SOL"), 6.0);
        assert!(portfolio.snapshot().reservations.is_empty());
    }

    #[test]
    fn test_released_reservation_frees_cash() {
        let portfolio = Portfolio::new(1_000.0);
        let reservation = portfolio.reserve("SOL", 600.0).unwrap();
        assert_eq!(reservation.asset(), "SOL");
        assert_eq!(reservation.amount(), 600.0);

        portfolio.release(reservation);
        assert_eq!(portfolio.available_cash(), 1_000.0);
        assert!(portfolio.reserve("BONK", 900.0).is_ok());
    }

    #[test]
    fn test_reserved_cash_still_counts_as_equity() {
        let portfolio = Portfolio::new(1_000.0);
        let _reservation = portfolio.reserve("SOL", 600.0).unwrap();
        assert_eq!(portfolio.snapshot().equity(), 1_000.0);
    }

    #[test]
    fn test_snapshot_equity_uses_last_prices() {
        let portfolio = Portfolio::new(1_000.0);
        portfolio.apply_trade("SOL", 1.0, 100.0).unwrap();
        portfolio.record_price("SOL", 150.0);

        assert_eq!(portfolio.snapshot().equity(), 1_050.0);
    }
}
