//! Deterministic synthetic price history
//!
//! Used when no usable live series exists. The walk is seeded from the
//! ticker so repeated requests for the same ticker and end date return
//! the same bars.

use chrono::{Duration, NaiveDate};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use sha2::{Digest, Sha256};

use crate::error::{Result, StockError};
use crate::fallback;
use crate::models::{HistoryPeriod, HistoryPoint};

const DEFAULT_BASE_PRICE: f64 = 100.0;
const VOLUME_MEAN: f64 = 1_000_000.0;
const VOLUME_STD_DEV: f64 = 500_000.0;

/// Seed derived from the first 8 bytes of SHA-256(ticker)
pub fn seed_for(ticker: &str) -> u64 {
    let digest = Sha256::digest(ticker.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Generate daily bars for `period`, ending on `today`, oldest first
pub fn generate(ticker: &str, period: HistoryPeriod, today: NaiveDate) -> Result<Vec<HistoryPoint>> {
    let num_points = period.num_points();
    let base_price = fallback::lookup(ticker).map_or(DEFAULT_BASE_PRICE, |entry| entry.price);

    let mut rng = StdRng::seed_from_u64(seed_for(ticker));
    let step = Normal::new(0.0, 1.0).map_err(|e| StockError::Generation(e.to_string()))?;
    let volume = Normal::new(VOLUME_MEAN, VOLUME_STD_DEV)
        .map_err(|e| StockError::Generation(e.to_string()))?;

    // All walk steps are drawn before any volume
    let steps: Vec<f64> = (0..num_points)
        .map(|_| step.sample(&mut rng) / 100.0)
        .collect();

    let mut level = 1.0;
    let mut points = Vec::with_capacity(num_points);
    for (i, change) in steps.into_iter().enumerate() {
        level *= 1.0 + change;
        let close = base_price * level;
        if !close.is_finite() || close <= 0.0 {
            return Err(StockError::Generation(format!(
                "random walk for {ticker} left the positive range"
            )));
        }

        let days_back = (num_points - 1 - i) as i64;
        let date = today
            .checked_sub_signed(Duration::days(days_back))
            .ok_or_else(|| StockError::Generation(format!("date out of range for {ticker}")))?;

        let drawn = volume.sample(&mut rng).trunc().max(0.0);

        points.push(HistoryPoint {
            date,
            open: round2(close * 0.99),
            high: round2(close * 1.02),
            low: round2(close * 0.98),
            close: round2(close),
            volume: drawn as u64,
        });
    }

    Ok(points)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
