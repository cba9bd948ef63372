use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::orderbook_cache::OrderbookCache;
use crate::path_evaluator::{PathEvaluation, PathEvaluator};
use crate::path_model::PathModel;
use crate::volatility_cache::VolatilityCache;

/// Strips a market code's `"EX::"` exchange prefix, if any, leaving the bare
/// `"QUOTE-BASE"` code used as the `market` argument to `OrderbookCache`.
/// Reconstructing `exchange::bare` reproduces the edge's full `market_code`,
/// so the two stores stay keyed consistently without threading a third
/// identifier through the path model.
fn bare_market_code(market_code: &str) -> &str {
    match market_code.split_once("::") {
        Some((_, rest)) => rest,
        None => market_code,
    }
}

/// Outcome of one scan pass: how many paths were priced, how many cleared
/// the profit floor, and the best result seen (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    pub evaluated: usize,
    pub opportunities: usize,
    pub duration_ms: f64,
    pub best_path_id: Option<String>,
    pub best_assets: Option<Vec<String>>,
    pub best_delta_final: Option<f64>,
}

/// Orchestrates one full pass over the static `PathModel`: for every path,
/// pull the required snapshots from the cache, hand them to the evaluator,
/// and track the best-scoring result. Holds no state across passes other
/// than the immutable graph/path inputs — each call to `run_once` is
/// independent, matching `ArbitrageScannerMulti.run_once`'s per-call return.
pub struct Scanner<'a> {
    config: &'a AppConfig,
    path_model: &'a PathModel,
    orderbook_cache: &'a OrderbookCache,
    volatility_cache: &'a VolatilityCache,
}

impl<'a> Scanner<'a> {
    pub fn new(
        config: &'a AppConfig,
        path_model: &'a PathModel,
        orderbook_cache: &'a OrderbookCache,
        volatility_cache: &'a VolatilityCache,
    ) -> Self {
        Self {
            config,
            path_model,
            orderbook_cache,
            volatility_cache,
        }
    }

    /// Runs one scan pass. Returns `None` if the orderbook cache has not yet
    /// received any data — mirroring the original's per-exchange wait loop —
    /// so callers can distinguish "not warmed up yet" from "zero paths
    /// cleared the bar this pass."
    pub fn run_once(&self, starting_notional: f64) -> Option<ScanSummary> {
        if !self.orderbook_cache.has_data() {
            info!("waiting for initial orderbook data before scanning");
            return None;
        }
        if starting_notional <= 0.0 {
            return None;
        }

        let started = Instant::now();
        let mut evaluated = 0usize;
        let mut opportunities = 0usize;
        let mut best: Option<(String, Vec<String>, PathEvaluation)> = None;

        let assets_in_paths = self.path_model.assets_in_use();
        let sigma_map = self.volatility_cache.snapshot_sigmas(&assets_in_paths, self.config);

        let evaluator = PathEvaluator::new(self.config);

        for path in self.path_model.paths() {
            let mut snapshots = IndexMap::new();
            let mut missing = false;
            for edge in &path.edges {
                let bare_market = bare_market_code(&edge.market_code);
                match self.orderbook_cache.snapshot(&edge.exchange, bare_market) {
                    Some(snap) => {
                        snapshots.insert(edge.market_code.clone(), snap);
                    }
                    None => {
                        missing = true;
                        break;
                    }
                }
            }
            if missing {
                continue;
            }

            evaluated += 1;
            let result = evaluator.evaluate(
                &path.path_id,
                &path.edges,
                &path.assets,
                starting_notional,
                &snapshots,
                &sigma_map,
                false,
            );

            if let Some(evaluation) = result.evaluation {
                opportunities += 1;
                if self.config.logging.log_paths {
                    debug!(
                        path_id = %path.path_id,
                        delta_final = evaluation.delta_final,
                        "path cleared profit floor"
                    );
                }
                let is_better = best
                    .as_ref()
                    .map(|(_, _, prev)| evaluation.delta_final > prev.delta_final)
                    .unwrap_or(true);
                if is_better {
                    best = Some((path.path_id.clone(), path.assets.clone(), evaluation));
                }
            }
        }

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let summary = match &best {
            Some((path_id, assets, evaluation)) => ScanSummary {
                evaluated,
                opportunities,
                duration_ms,
                best_path_id: Some(path_id.clone()),
                best_assets: Some(assets.clone()),
                best_delta_final: Some(evaluation.delta_final),
            },
            None => ScanSummary {
                evaluated,
                opportunities,
                duration_ms,
                best_path_id: None,
                best_assets: None,
                best_delta_final: None,
            },
        };

        if self.config.logging.heartbeat_enabled {
            info!(
                evaluated = summary.evaluated,
                opportunities = summary.opportunities,
                duration_ms = summary.duration_ms,
                best_delta_final = ?summary.best_delta_final,
                "scan pass complete"
            );
        }

        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_graph::{MarketGraph, MarketInfo};
    use crate::orderbook_cache::OrderbookLevel;

    fn level(price: f64, size: f64) -> OrderbookLevel {
        OrderbookLevel { price, size }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.anchor = "USD".to_string();
        config.risk_model.fee_rate = 0.0;
        config.risk_model.min_profit_margin = 0.0;
        config.min_order.min_notional_multiplier = 1.0;
        config.min_order.first_leg_multiplier = 1.0;
        config.paths.min_length = 2;
        config.paths.max_length = 2;
        config
    }

    #[test]
    fn run_once_returns_none_before_cache_is_warm() {
        let config = test_config();
        let markets = vec![MarketInfo::new("USD-BTC", "BTC", "USD")];
        let graph = MarketGraph::build(&markets, &config);
        let path_model = PathModel::build(&graph, &config);
        let orderbook_cache = OrderbookCache::new();
        let volatility_cache = VolatilityCache::new(&config);

        let scanner = Scanner::new(&config, &path_model, &orderbook_cache, &volatility_cache);
        assert!(scanner.run_once(100.0).is_none());
    }

    #[test]
    fn run_once_tracks_the_best_opportunity() {
        let config = test_config();
        let markets = vec![MarketInfo::new("USD-BTC", "BTC", "USD")];
        let graph = MarketGraph::build(&markets, &config);
        let path_model = PathModel::build(&graph, &config);
        let orderbook_cache = OrderbookCache::new();
        let volatility_cache = VolatilityCache::new(&config);

        orderbook_cache.update("", "USD-BTC", vec![level(101.0, 10.0)], vec![level(100.0, 10.0)], 1);

        let scanner = Scanner::new(&config, &path_model, &orderbook_cache, &volatility_cache);
        let summary = scanner.run_once(100.0).expect("cache is warm");
        assert_eq!(summary.evaluated, 1);
        assert_eq!(summary.opportunities, 1);
        assert_eq!(summary.best_path_id, Some("path_1".to_string()));
        assert!(summary.best_delta_final.unwrap() > 0.0);
    }

    #[test]
    fn run_once_skips_paths_with_missing_snapshots() {
        let config = test_config();
        let markets = vec![
            MarketInfo::new("USD-BTC", "BTC", "USD"),
            MarketInfo::new("USD-ETH", "ETH", "USD"),
        ];
        let graph = MarketGraph::build(&markets, &config);
        let path_model = PathModel::build(&graph, &config);
        let orderbook_cache = OrderbookCache::new();
        let volatility_cache = VolatilityCache::new(&config);

        // Only seed BTC's book; the ETH path must be skipped, not rejected.
        orderbook_cache.update("", "USD-BTC", vec![level(99.0, 10.0)], vec![level(100.0, 10.0)], 1);

        let scanner = Scanner::new(&config, &path_model, &orderbook_cache, &volatility_cache);
        let summary = scanner.run_once(100.0).expect("cache is warm");
        assert_eq!(summary.evaluated, 1);
    }
}
