//! Cyclic arbitrage scanner core.
//!
//! Exposes the graph/path/evaluator/cache stack so the `scanner` binary (and
//! tests) can drive it end-to-end. The core is deliberately pure: the only
//! I/O this library performs is config loading; everything else is a
//! function of in-memory snapshots.

pub mod config;
pub mod error;
pub mod feed;
pub mod market_graph;
pub mod opportunity_log;
pub mod orderbook_cache;
pub mod path_evaluator;
pub mod path_model;
pub mod scanner;
pub mod self_test;
pub mod volatility_cache;

pub use config::AppConfig;
pub use error::{ConfigError, EvaluationRejection, FeedError};
pub use market_graph::MarketGraph;
pub use opportunity_log::OpportunityLog;
pub use orderbook_cache::OrderbookCache;
pub use path_evaluator::PathEvaluator;
pub use path_model::PathModel;
pub use scanner::{ScanSummary, Scanner};
pub use volatility_cache::VolatilityCache;
