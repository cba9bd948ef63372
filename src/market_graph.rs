use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// A listed market, keyed by an opaque `market_code` of the form
/// `"QUOTE-BASE"`, optionally prefixed `"EX::"` to tag an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketInfo {
    pub market_code: String,
    pub base: String,
    pub quote: String,
}

impl MarketInfo {
    pub fn new(market_code: impl Into<String>, base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            market_code: market_code.into(),
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Exchange tag if the market code carries an `"EX::"`-style prefix
    /// before the first `"::"`, else empty.
    pub fn exchange_tag(&self) -> &str {
        match self.market_code.split_once("::") {
            Some((tag, _)) => tag,
            None => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// A directed trading action at a specific side of a specific market.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEdge {
    pub market_code: String,
    pub from_asset: String,
    pub to_asset: String,
    pub side: Side,
    pub fee_rate: f64,
    pub min_total: f64,
    pub exchange: String,
}

/// Directed multigraph over assets, built once from a market listing and
/// immutable afterward. Adjacency is insertion-ordered so that enumeration
/// over `out_edges` is deterministic across runs and across repeated calls,
/// matching the discipline the original keeps by relying on Python's
/// insertion-ordered `dict`.
#[derive(Debug, Clone)]
pub struct MarketGraph {
    by_source: IndexMap<String, Vec<MarketEdge>>,
}

impl MarketGraph {
    /// Builds the graph from a market listing. Each market contributes a
    /// `quote -> base` buy edge and a `base -> quote` sell edge, both at the
    /// configured `risk_model.fee_rate` — moved out of a hard-coded constant
    /// in the original graph builder into an explicit config knob.
    pub fn build(markets: &[MarketInfo], config: &AppConfig) -> Self {
        let mut graph = MarketGraph {
            by_source: IndexMap::new(),
        };

        for market in markets {
            let min_total = config.min_order.min_total_for_quote(&market.quote);
            let exchange = market.exchange_tag().to_string();

            graph.add_edge(MarketEdge {
                market_code: market.market_code.clone(),
                from_asset: market.quote.clone(),
                to_asset: market.base.clone(),
                side: Side::Buy,
                fee_rate: config.risk_model.fee_rate,
                min_total,
                exchange: exchange.clone(),
            });

            graph.add_edge(MarketEdge {
                market_code: market.market_code.clone(),
                from_asset: market.base.clone(),
                to_asset: market.quote.clone(),
                side: Side::Sell,
                fee_rate: config.risk_model.fee_rate,
                min_total,
                exchange,
            });
        }

        graph
    }

    fn add_edge(&mut self, edge: MarketEdge) {
        self.by_source
            .entry(edge.from_asset.clone())
            .or_default()
            .push(edge);
    }

    /// Edges leaving `asset`, in insertion (listing) order.
    pub fn out_edges(&self, asset: &str) -> &[MarketEdge] {
        self.by_source.get(asset).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.by_source.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn each_market_contributes_one_buy_and_one_sell_edge() {
        let markets = vec![MarketInfo::new("USDT-BTC", "BTC", "USDT")];
        let graph = MarketGraph::build(&markets, &config());

        let buy = graph.out_edges("USDT");
        assert_eq!(buy.len(), 1);
        assert_eq!(buy[0].side, Side::Buy);
        assert_eq!(buy[0].to_asset, "BTC");
        assert_eq!(buy[0].market_code, "USDT-BTC");

        let sell = graph.out_edges("BTC");
        assert_eq!(sell.len(), 1);
        assert_eq!(sell[0].side, Side::Sell);
        assert_eq!(sell[0].to_asset, "USDT");
        assert_eq!(sell[0].market_code, "USDT-BTC");
    }

    #[test]
    fn out_edges_preserve_listing_order() {
        let markets = vec![
            MarketInfo::new("USDT-BTC", "BTC", "USDT"),
            MarketInfo::new("USDT-ETH", "ETH", "USDT"),
        ];
        let graph = MarketGraph::build(&markets, &config());
        let out = graph.out_edges("USDT");
        assert_eq!(out[0].to_asset, "BTC");
        assert_eq!(out[1].to_asset, "ETH");
    }

    #[test]
    fn exchange_tag_is_preserved_on_both_edges() {
        let markets = vec![MarketInfo::new("BIN::USDT-BTC", "BTC", "USDT")];
        let graph = MarketGraph::build(&markets, &config());
        assert_eq!(graph.out_edges("USDT")[0].exchange, "BIN");
        assert_eq!(graph.out_edges("BTC")[0].exchange, "BIN");
    }

    #[test]
    fn unknown_quote_falls_back_to_default_min_notional() {
        let markets = vec![MarketInfo::new("ETH-BTC", "BTC", "ETH")];
        let graph = MarketGraph::build(&markets, &config());
        assert_eq!(graph.out_edges("ETH")[0].min_total, 1.0);
    }
}
