//! Average True Range (ATR)
//!
//! True Range is the greatest of:
//! - High - Low
//! - Abs(High - Previous Close)
//! - Abs(Low - Previous Close)
//!
//! Smoothed with Wilder's method.
use crate::models::PriceSample;

fn true_ranges<'a>(samples: impl Iterator<Item = &'a PriceSample>) -> Vec<f64> {
    let mut ranges = Vec::new();
    let mut prev_close: Option<f64> = None;

    for sample in samples {
        if let Some(prev) = prev_close {
            let tr = (sample.high - sample.low)
                .max((sample.high - prev).abs())
                .max((sample.low - prev).abs());
            ranges.push(tr);
        }
        prev_close = Some(sample.close);
    }

    ranges
}

/// Calculate ATR over the samples, or None with fewer than `period + 1` samples
pub fn calculate_atr<'a, I>(samples: I, period: usize) -> Option<f64>
where
    I: IntoIterator<Item = &'a PriceSample>,
{
    if period == 0 {
        return None;
    }

    let ranges = true_ranges(samples.into_iter());
    if ranges.len() < period {
        return None;
    }

    let first_atr: f64 = ranges.iter().take(period).sum::<f64>() / period as f64;

    let atr = ranges[period..].iter().fold(first_atr, |atr, tr| {
        (atr * (period as f64 - 1.0) + tr) / period as f64
    });

    Some(atr)
}

/// Volatility measure used for sizing.
///
/// ATR at `period`, shrinking the period to what the samples can support.
/// Returns 0.0 when fewer than two samples exist; callers treat a
/// non-positive measure as "unknown volatility".
pub fn volatility_measure(samples: &[PriceSample], period: usize) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let usable = period.min(samples.len() - 1).max(1);
    calculate_atr(samples, usable).unwrap_or(0.0)
}
