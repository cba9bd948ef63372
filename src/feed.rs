//! Collaborator interfaces consumed (not implemented in full production
//! depth) by the core: market listing, order-book and ticker feeds, and an
//! account balance source. These are thin reference adapters — a combined
//! Binance depth/ticker stream and a static balance — grounded in the
//! teacher's `scrapers::binance_book_ticker` reconnect-loop idiom, sufficient
//! to run the scanner end-to-end. They carry none of the scoring logic.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::market_graph::MarketInfo;
use crate::orderbook_cache::{OrderbookCache, OrderbookLevel};
use crate::volatility_cache::{Ticker, VolatilityCache};

/// Provides the market universe once at startup. Market codes are
/// `"QUOTE-BASE"`, optionally prefixed `"EX::"`.
#[async_trait]
pub trait MarketListingSource: Send + Sync {
    async fn list_markets(&self) -> Result<Vec<MarketInfo>>;
}

/// A fixed, config-driven market universe. The reference implementation for
/// deployments that don't need a live listing endpoint — matches the
/// simplicity of the teacher's `Config::from_env` pattern for knobs that
/// don't warrant a REST round trip.
pub struct StaticMarketListing {
    markets: Vec<MarketInfo>,
}

impl StaticMarketListing {
    pub fn new(markets: Vec<MarketInfo>) -> Self {
        Self { markets }
    }
}

#[async_trait]
impl MarketListingSource for StaticMarketListing {
    async fn list_markets(&self) -> Result<Vec<MarketInfo>> {
        Ok(self.markets.clone())
    }
}

/// Raw wire shape of one row in a REST market-listing endpoint's response.
#[derive(Debug, Deserialize)]
struct ListingRow {
    market_code: String,
    base: String,
    quote: String,
}

/// Fetches the market universe from an HTTP endpoint returning a JSON array
/// of `{market_code, base, quote}` rows, once per `list_markets()` call.
/// Grounded in the teacher's `scrapers::polymarket_gamma` listing fetch
/// (a plain `reqwest::Client::get(...).json()` round trip), stripped of its
/// Gamma-specific field set since this only needs the market triple.
pub struct RestMarketListing {
    client: reqwest::Client,
    url: String,
}

impl RestMarketListing {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl MarketListingSource for RestMarketListing {
    async fn list_markets(&self) -> Result<Vec<MarketInfo>> {
        let rows: Vec<ListingRow> = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("failed to fetch market listing from {}", self.url))?
            .error_for_status()
            .with_context(|| format!("market listing endpoint {} returned an error status", self.url))?
            .json()
            .await
            .context("failed to parse market listing response")?;
        Ok(rows
            .into_iter()
            .map(|r| MarketInfo::new(r.market_code, r.base, r.quote))
            .collect())
    }
}

/// Provides anchor-denominated free balance used as `starting_notional`.
/// Not part of the evaluator; required by the driver.
#[async_trait]
pub trait AccountBalanceSource: Send + Sync {
    async fn free_balance(&self, anchor: &str) -> Result<f64>;
}

/// Env/config-configured static balance (`STARTING_NOTIONAL`). A full
/// account/balance REST client is out of scope for this core.
pub struct StaticBalanceSource {
    balance: f64,
}

impl StaticBalanceSource {
    pub fn new(balance: f64) -> Self {
        Self { balance }
    }
}

#[async_trait]
impl AccountBalanceSource for StaticBalanceSource {
    async fn free_balance(&self, _anchor: &str) -> Result<f64> {
        Ok(self.balance)
    }
}

/// Raw wire shape for a Binance-style combined depth stream frame:
/// `{"stream": "...", "data": {"bids": [[price, size], ...], "asks": [...], ...}}`.
#[derive(Debug, Deserialize)]
struct CombinedFrame {
    stream: String,
    data: DepthPayload,
}

#[derive(Debug, Deserialize)]
struct DepthPayload {
    #[serde(default, rename = "b")]
    bids: Vec<[String; 2]>,
    #[serde(default, rename = "a")]
    asks: Vec<[String; 2]>,
}

fn parse_levels(raw: &[[String; 2]]) -> Vec<OrderbookLevel> {
    raw.iter()
        .filter_map(|[p, s]| {
            let price: f64 = p.parse().ok()?;
            let size: f64 = s.parse().ok()?;
            Some(OrderbookLevel { price, size })
        })
        .collect()
}

/// Maps a lowercase Binance stream symbol (e.g. `"btcusdt"`) back to the
/// scanner's `"QUOTE-BASE"` market code, using the caller-provided universe
/// so the feed never has to guess a base/quote split.
fn market_code_for_stream(stream: &str, markets: &[MarketInfo]) -> Option<String> {
    let symbol = stream.split('@').next()?.to_uppercase();
    markets
        .iter()
        .find(|m| format!("{}{}", m.quote, m.base).eq_ignore_ascii_case(&symbol))
        .map(|m| m.market_code.clone())
}

/// Live depth-diff feed over Binance's public combined-stream WebSocket,
/// publishing directly into an `OrderbookCache`. Reconnects with capped
/// exponential backoff, matching the teacher's `binance_book_ticker`
/// `run_loop`/`connect_and_stream` split.
pub struct BinanceDepthFeed {
    stream_base_url: String,
    markets: Vec<MarketInfo>,
    exchange_tag: String,
}

impl BinanceDepthFeed {
    pub fn new(markets: Vec<MarketInfo>, exchange_tag: impl Into<String>) -> Self {
        Self {
            stream_base_url: "wss://stream.binance.com:9443/stream".to_string(),
            markets,
            exchange_tag: exchange_tag.into(),
        }
    }

    /// Runs until `shutdown` resolves, reconnecting on any stream error.
    /// Matches the teacher's pattern of a `tokio::select!` against a
    /// shutdown future at the task's outer loop, not mid-frame.
    pub async fn run(&self, cache: Arc<OrderbookCache>, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut backoff = Duration::from_millis(200);
        let max_backoff = Duration::from_secs(30);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("depth feed shutting down");
                    return;
                }
                result = self.connect_and_stream(&cache) => {
                    match result {
                        Ok(()) => backoff = Duration::from_millis(200),
                        Err(err) => warn!(error = %err, "depth feed disconnected, retrying"),
                    }
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
        }
    }

    async fn connect_and_stream(&self, cache: &Arc<OrderbookCache>) -> Result<()> {
        let streams: Vec<String> = self
            .markets
            .iter()
            .map(|m| format!("{}{}@depth10@100ms", m.quote.to_lowercase(), m.base.to_lowercase()))
            .collect();
        let url = format!("{}?streams={}", self.stream_base_url, streams.join("/"));

        let (ws_stream, _) = connect_async(&url).await.context("failed to connect to depth feed")?;
        let (mut write, mut read) = ws_stream.split();

        while let Some(message) = read.next().await {
            let message = message.context("depth feed stream error")?;
            match message {
                Message::Text(text) => self.handle_frame(&text, cache),
                Message::Ping(payload) => {
                    write.send(Message::Pong(payload)).await.ok();
                }
                Message::Close(_) => return Ok(()),
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_frame(&self, text: &str, cache: &Arc<OrderbookCache>) {
        let Ok(frame) = serde_json::from_str::<CombinedFrame>(text) else {
            return;
        };
        let Some(market_code) = market_code_for_stream(&frame.stream, &self.markets) else {
            return;
        };
        let bids = parse_levels(&frame.data.bids);
        let asks = parse_levels(&frame.data.asks);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let bare_market = match market_code.split_once("::") {
            Some((_, rest)) => rest.to_string(),
            None => market_code,
        };
        cache.update(&self.exchange_tag, &bare_market, bids, asks, now_ms);
    }
}

/// Live trade-ticker feed, publishing anchor-quoted trades into a
/// `VolatilityCache`. Shares the reconnect idiom with `BinanceDepthFeed`.
pub struct BinanceTickerFeed {
    stream_base_url: String,
    markets: Vec<MarketInfo>,
    anchor: String,
}

#[derive(Debug, Deserialize)]
struct TickerFrame {
    data: TickerPayload,
}

#[derive(Debug, Deserialize)]
struct TickerPayload {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "E")]
    event_time_ms: i64,
}

impl BinanceTickerFeed {
    pub fn new(markets: Vec<MarketInfo>, anchor: impl Into<String>) -> Self {
        Self {
            stream_base_url: "wss://stream.binance.com:9443/stream".to_string(),
            markets,
            anchor: anchor.into(),
        }
    }

    pub async fn run(&self, cache: Arc<VolatilityCache>, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut backoff = Duration::from_millis(200);
        let max_backoff = Duration::from_secs(30);

        loop {
            tokio::select! {
                _ = &mut shutdown => return,
                result = self.connect_and_stream(&cache) => {
                    match result {
                        Ok(()) => backoff = Duration::from_millis(200),
                        Err(err) => warn!(error = %err, "ticker feed disconnected, retrying"),
                    }
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
        }
    }

    async fn connect_and_stream(&self, cache: &Arc<VolatilityCache>) -> Result<()> {
        let anchor_markets: Vec<&MarketInfo> = self.markets.iter().filter(|m| m.quote == self.anchor).collect();
        if anchor_markets.is_empty() {
            return Ok(());
        }
        let streams: Vec<String> = anchor_markets
            .iter()
            .map(|m| format!("{}{}@trade", m.quote.to_lowercase(), m.base.to_lowercase()))
            .collect();
        let url = format!("{}?streams={}", self.stream_base_url, streams.join("/"));

        let (ws_stream, _) = connect_async(&url).await.context("failed to connect to ticker feed")?;
        let (_, mut read) = ws_stream.split();

        while let Some(message) = read.next().await {
            let message = message.context("ticker feed stream error")?;
            if let Message::Text(text) = message {
                self.handle_frame(&text, cache);
            }
        }
        Ok(())
    }

    fn handle_frame(&self, text: &str, cache: &Arc<VolatilityCache>) {
        let Ok(frame) = serde_json::from_str::<TickerFrame>(text) else {
            return;
        };
        let Ok(price) = frame.data.price.parse::<f64>() else {
            return;
        };
        let Some(market) = self
            .markets
            .iter()
            .find(|m| format!("{}{}", m.quote, m.base).eq_ignore_ascii_case(&frame.data.symbol))
        else {
            return;
        };
        let ticker = Ticker {
            market: format!("{}-{}", market.quote, market.base),
            timestamp_ms: frame.data.event_time_ms,
            trade_price: price,
        };
        cache.update_from_ticker(&ticker, &self.anchor);
    }
}
