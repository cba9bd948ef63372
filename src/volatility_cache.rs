use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::config::{default_sigma_for_tier, AppConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
struct PriceSample {
    timestamp_ms: i64,
    price: f64,
}

/// Raw ticker event, as delivered by the ticker feed collaborator. `market`
/// is `"QUOTE-BASE"`; only tickers whose quote matches the configured anchor
/// feed the cache.
#[derive(Debug, Clone)]
pub struct Ticker {
    pub market: String,
    pub timestamp_ms: i64,
    pub trade_price: f64,
}

/// Sliding per-asset window of recent anchor-quoted trade prices, used to
/// derive a time-normalised return volatility for each asset.
pub struct VolatilityCache {
    window_seconds: u64,
    sampling_interval_seconds: f64,
    samples: Mutex<HashMap<String, VecDeque<PriceSample>>>,
}

impl VolatilityCache {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            window_seconds: config.risk_model.volatility_window_seconds,
            sampling_interval_seconds: config.risk_model.volatility_sampling_interval_seconds,
            samples: Mutex::new(HashMap::new()),
        }
    }

    /// Appends a sample if `ticker.market`'s quote matches `anchor`, then
    /// prunes anything older than the configured window.
    pub fn update_from_ticker(&self, ticker: &Ticker, anchor: &str) {
        let Some((quote, base)) = ticker.market.split_once('-') else {
            return;
        };
        if quote != anchor {
            return;
        }
        if ticker.trade_price <= 0.0 {
            return;
        }

        let cutoff = ticker.timestamp_ms - (self.window_seconds as i64) * 1000;
        let mut samples = self.samples.lock();
        let window = samples.entry(base.to_string()).or_default();
        window.push_back(PriceSample {
            timestamp_ms: ticker.timestamp_ms,
            price: ticker.trade_price,
        });
        while window.front().map(|s| s.timestamp_ms < cutoff).unwrap_or(false) {
            window.pop_front();
        }
    }

    /// Per-second return sigma for `asset`. Falls back to the tier default
    /// when fewer than two samples are available.
    pub fn get_sigma(&self, asset: &str, config: &AppConfig) -> f64 {
        let samples = self.samples.lock();
        let window = samples.get(asset);
        match window {
            Some(w) if w.len() >= 2 => sigma_from_window(w, self.sampling_interval_seconds),
            _ => default_sigma_for_tier(config.token_rule(asset).volatility_tier),
        }
    }

    pub fn snapshot_sigmas(&self, assets: &[String], config: &AppConfig) -> HashMap<String, f64> {
        assets
            .iter()
            .map(|a| (a.clone(), self.get_sigma(a, config)))
            .collect()
    }

    pub fn has_data(&self) -> bool {
        self.samples.lock().values().any(|w| !w.is_empty())
    }
}

fn log_return(current: f64, previous: f64) -> Option<f64> {
    if current <= 0.0 || previous <= 0.0 {
        return None;
    }
    Some((current / previous).ln())
}

/// Population variance of consecutive log-returns, normalised by the mean
/// inter-sample interval to a per-second sigma. Mirrors the original's use of
/// `statistics.pstdev` — population, not sample, variance — documented as a
/// deliberate choice rather than an oversight.
fn sigma_from_window(window: &VecDeque<PriceSample>, fallback_interval: f64) -> f64 {
    let mut returns = Vec::with_capacity(window.len());
    let mut deltas = Vec::with_capacity(window.len());

    for pair in window.iter().collect::<Vec<_>>().windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        if let Some(r) = log_return(cur.price, prev.price) {
            returns.push(r);
        }
        if cur.timestamp_ms > prev.timestamp_ms {
            deltas.push((cur.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0);
        }
    }

    if returns.is_empty() {
        return 0.0;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let sigma = variance.max(0.0).sqrt();

    let avg_delta = if deltas.is_empty() {
        fallback_interval
    } else {
        deltas.iter().sum::<f64>() / deltas.len() as f64
    };
    let avg_delta = if avg_delta <= 0.0 {
        fallback_interval
    } else {
        avg_delta
    };

    sigma / avg_delta.sqrt()
}
