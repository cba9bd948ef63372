//! Cyclic arbitrage scanner
//!
//! Continuously enumerates closed cycles over a live order-book feed,
//! simulates walking each one against current depth net of fees, and
//! surfaces the best opportunity above a configurable profit threshold.
//! This binary wires the core (graph, path model, caches, evaluator,
//! scanner) together with a reference Binance-shaped feed; it does not
//! place orders.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cyclic_arb_scanner::config::AppConfig;
use cyclic_arb_scanner::feed::{
    AccountBalanceSource, BinanceDepthFeed, BinanceTickerFeed, MarketListingSource,
    StaticBalanceSource, StaticMarketListing,
};
use cyclic_arb_scanner::market_graph::{MarketGraph, MarketInfo};
use cyclic_arb_scanner::opportunity_log::OpportunityLog;
use cyclic_arb_scanner::orderbook_cache::OrderbookCache;
use cyclic_arb_scanner::path_model::PathModel;
use cyclic_arb_scanner::scanner::Scanner;
use cyclic_arb_scanner::self_test;
use cyclic_arb_scanner::volatility_cache::VolatilityCache;

#[derive(Debug, Parser)]
#[command(name = "scanner", about = "Cyclic arbitrage scanner over a live order-book feed")]
struct Cli {
    /// Path to a TOML config file; falls back to defaults + env overrides if absent.
    #[arg(long, env = "SCANNER_CONFIG", default_value = "config.toml")]
    config: String,

    /// Path to a JSON file of `{market_code, base, quote}` market listings.
    /// Without this, a small built-in demo universe is used.
    #[arg(long, env = "SCANNER_MARKETS")]
    markets: Option<String>,

    /// Run the self-test and one scan pass against a synthetic seed book,
    /// then exit, instead of connecting to a live feed. Overrides
    /// `bot_mode.dry_run` from the config file.
    #[arg(long)]
    dry_run: bool,

    /// Path to a SQLite file for logging opportunities found while scanning.
    /// Without this, opportunities are logged to an in-memory database that
    /// is discarded on exit.
    #[arg(long, env = "SCANNER_OPPORTUNITY_LOG")]
    opportunity_log: Option<String>,
}

fn default_markets() -> Vec<MarketInfo> {
    vec![
        MarketInfo::new("USDT-BTC", "BTC", "USDT"),
        MarketInfo::new("USDT-ETH", "ETH", "USDT"),
        MarketInfo::new("BTC-ETH", "ETH", "BTC"),
    ]
}

fn load_markets(path: &str) -> Result<Vec<MarketInfo>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read market listing {path}"))?;

    #[derive(serde::Deserialize)]
    struct Row {
        market_code: String,
        base: String,
        quote: String,
    }
    let rows: Vec<Row> = serde_json::from_str(&raw).context("failed to parse market listing JSON")?;
    Ok(rows
        .into_iter()
        .map(|r| MarketInfo::new(r.market_code, r.base, r.quote))
        .collect())
}

fn init_tracing(debug_mode: bool) {
    let default_directive = if debug_mode {
        "cyclic_arb_scanner=debug"
    } else {
        "cyclic_arb_scanner=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Seeds a synthetic two-market book so `--dry-run` and first-run self-tests
/// have something to evaluate without a network connection.
fn seed_demo_books(cache: &OrderbookCache, markets: &[MarketInfo]) {
    use cyclic_arb_scanner::orderbook_cache::OrderbookLevel;
    for market in markets {
        let bare = market.market_code.split_once("::").map(|(_, r)| r).unwrap_or(&market.market_code);
        cache.update(
            market.exchange_tag(),
            bare,
            vec![OrderbookLevel { price: 99.9, size: 50.0 }],
            vec![OrderbookLevel { price: 100.0, size: 50.0 }],
            chrono::Utc::now().timestamp_millis(),
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config).context("failed to load config")?;
    if cli.dry_run {
        config.bot_mode.dry_run = true;
    }
    init_tracing(config.logging.debug_mode);

    info!(anchor = %config.anchor, dry_run = config.bot_mode.dry_run, "starting cyclic arbitrage scanner");

    let markets = match &cli.markets {
        Some(path) => load_markets(path)?,
        None => {
            warn!("no --markets file given, using built-in demo universe");
            default_markets()
        }
    };
    let listing = StaticMarketListing::new(markets);
    let markets = listing.list_markets().await?;
    if markets.is_empty() {
        anyhow::bail!("no markets available for configured tokens");
    }

    let graph = MarketGraph::build(&markets, &config);
    let path_model = PathModel::build(&graph, &config);
    info!(
        paths = path_model.paths().len(),
        markets = path_model.markets_in_use().len(),
        "path model ready"
    );
    if path_model.paths().is_empty() {
        warn!(anchor = %config.anchor, "no anchored paths generated; check token configuration");
    }

    let orderbook_cache = Arc::new(OrderbookCache::new());
    let volatility_cache = Arc::new(VolatilityCache::new(&config));

    let balance_source = StaticBalanceSource::new(config.starting_notional);
    let starting_notional = balance_source.free_balance(&config.anchor).await?;

    let opportunity_log = match &cli.opportunity_log {
        Some(path) => OpportunityLog::open(path).context("failed to open opportunity log")?,
        None => OpportunityLog::open_in_memory().context("failed to open in-memory opportunity log")?,
    };

    if config.bot_mode.dry_run {
        seed_demo_books(&orderbook_cache, &markets);
        self_test::run(&config, &graph, &orderbook_cache, starting_notional)?;
        let scanner = Scanner::new(&config, &path_model, &orderbook_cache, &volatility_cache);
        match scanner.run_once(starting_notional) {
            Some(summary) => {
                opportunity_log.record(&summary, chrono::Utc::now().timestamp_millis());
                info!(?summary, "dry-run scan pass complete");
            }
            None => info!("dry-run scan pass produced no summary (cache not warm)"),
        }
        return Ok(());
    }

    self_test::run(&config, &graph, &orderbook_cache, starting_notional)?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let depth_feed = BinanceDepthFeed::new(markets.clone(), String::new());
    let depth_cache = orderbook_cache.clone();
    let mut depth_shutdown = shutdown_tx.subscribe();
    let depth_handle = tokio::spawn(async move {
        depth_feed
            .run(depth_cache, async move {
                let _ = depth_shutdown.recv().await;
            })
            .await;
    });

    let ticker_feed = BinanceTickerFeed::new(markets.clone(), config.anchor.clone());
    let ticker_cache = volatility_cache.clone();
    let mut ticker_shutdown = shutdown_tx.subscribe();
    let ticker_handle = tokio::spawn(async move {
        ticker_feed
            .run(ticker_cache, async move {
                let _ = ticker_shutdown.recv().await;
            })
            .await;
    });

    let scan_interval = Duration::from_millis(config.scanner.scan_interval_ms.max(1));
    let mut ticks = tokio::time::interval(scan_interval);

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                let scanner = Scanner::new(&config, &path_model, &orderbook_cache, &volatility_cache);
                if let Some(summary) = scanner.run_once(starting_notional) {
                    if summary.opportunities > 0 {
                        info!(
                            best_path = ?summary.best_path_id,
                            best_delta_final = ?summary.best_delta_final,
                            "opportunity found"
                        );
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, stopping feeds");
                let _ = shutdown_tx.send(());
                break;
            }
        }
    }

    let _ = depth_handle.await;
    let _ = ticker_handle.await;
    Ok(())
}
