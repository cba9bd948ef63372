use std::collections::HashMap;

use indexmap::IndexMap;

use crate::config::AppConfig;
use crate::error::EvaluationRejection;
use crate::market_graph::{MarketEdge, Side};
use crate::orderbook_cache::OrderbookSnapshot;

/// Remaining-quote closure tolerance for a simulated fill. A design constant
/// from the original evaluator, not a tunable.
const REMAINING_EPSILON: f64 = 1e-9;

/// A single top-of-book level captured for debug output, independent of the
/// live snapshot it was read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthLevel {
    pub price: f64,
    pub size: f64,
}

/// Outcome of simulating one edge against its snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LegResult {
    pub market_code: String,
    pub side: Side,
    pub notional_quote: f64,
    pub effective_price: f64,
    pub input_amount: f64,
    pub output_amount: f64,
    pub fee_rate: f64,
    pub depth_used: Vec<DepthLevel>,
}

/// A successful walk of a path: `delta_final` cleared the profit floor.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEvaluation {
    pub path_id: String,
    pub starting_amount: f64,
    pub final_amount: f64,
    pub delta_inst: f64,
    pub delta_vol: f64,
    pub delta_slip: f64,
    pub delta_final: f64,
    pub legs: Vec<LegResult>,
}

/// Captured top-of-book view for one market, truncated to a fixed depth.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderbookView {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// Diagnostic record returned alongside (or instead of) a `PathEvaluation`
/// when the caller asked for `debug`. Carries the rejection reason even on
/// an accepted walk, where the reason is the sentinel `"evaluated"`.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationDebug {
    pub path_id: String,
    pub assets: Vec<String>,
    pub starting_amount: f64,
    pub final_amount: f64,
    pub delta_inst: f64,
    pub delta_vol: f64,
    pub delta_slip: f64,
    pub delta_final: f64,
    pub reason: String,
    pub legs: Vec<LegResult>,
    pub orderbooks: HashMap<String, OrderbookView>,
}

/// Result of one `PathEvaluator::evaluate` call.
pub struct Evaluated {
    pub evaluation: Option<PathEvaluation>,
    pub debug: Option<EvaluationDebug>,
}

const DEPTH_CAPTURE_LEVELS: usize = 5;

/// Deterministic depth-walking simulator. Holds no mutable state of its own
/// beyond a config reference; every call is a pure function of its
/// arguments, per the concurrency model's "evaluator holds no locks" rule.
pub struct PathEvaluator<'a> {
    config: &'a AppConfig,
}

impl<'a> PathEvaluator<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    /// Walks `edges`/`assets` starting from `starting_notional`, against the
    /// frozen `snapshots` map, scoring the result against `sigma_by_asset`.
    /// `debug` controls whether an `EvaluationDebug` record is populated on
    /// every code path, including a successful walk (reason `"evaluated"`).
    pub fn evaluate(
        &self,
        path_id: &str,
        edges: &[MarketEdge],
        assets: &[String],
        starting_notional: f64,
        snapshots: &IndexMap<String, std::sync::Arc<OrderbookSnapshot>>,
        sigma_by_asset: &HashMap<String, f64>,
        debug: bool,
    ) -> Evaluated {
        let orderbook_views = if debug {
            capture_books(edges, snapshots, DEPTH_CAPTURE_LEVELS)
        } else {
            HashMap::new()
        };

        if let Some(first) = edges.first() {
            let required_first_leg = first.min_total * self.config.min_order.first_leg_multiplier;
            if starting_notional < required_first_leg {
                return self.fail(
                    path_id,
                    assets,
                    starting_notional,
                    starting_notional,
                    Vec::new(),
                    EvaluationRejection::StartingNotionalBelowMinimum.to_string(),
                    orderbook_views,
                    debug,
                );
            }
        }

        let mut current_amount = starting_notional;
        let mut legs: Vec<LegResult> = Vec::new();
        let mut total_slippage = 0.0;

        for (idx, edge) in edges.iter().enumerate() {
            debug_assert!(current_amount > 0.0, "zero notional entering leg {}", edge.market_code);
            if current_amount <= 0.0 {
                return self.fail(
                    path_id,
                    assets,
                    starting_notional,
                    current_amount,
                    legs,
                    "leg received zero notional".to_string(),
                    orderbook_views,
                    debug,
                );
            }

            let Some(snapshot) = snapshots.get(&edge.market_code) else {
                return self.fail(
                    path_id,
                    assets,
                    starting_notional,
                    current_amount,
                    legs,
                    EvaluationRejection::MissingSnapshot {
                        market_code: edge.market_code.clone(),
                    }
                    .to_string(),
                    orderbook_views,
                    debug,
                );
            };
            if !snapshot.is_valid() {
                return self.fail(
                    path_id,
                    assets,
                    starting_notional,
                    current_amount,
                    legs,
                    EvaluationRejection::InvalidSnapshot {
                        market_code: edge.market_code.clone(),
                    }
                    .to_string(),
                    orderbook_views,
                    debug,
                );
            }
            if !has_input_for_leg(current_amount, edge, snapshot, self.config.min_order.min_notional_multiplier) {
                return self.fail(
                    path_id,
                    assets,
                    starting_notional,
                    current_amount,
                    legs,
                    EvaluationRejection::InputBelowMinimum {
                        market_code: edge.market_code.clone(),
                    }
                    .to_string(),
                    orderbook_views,
                    debug,
                );
            }

            let multiplier = if idx == 0 {
                self.config.min_order.first_leg_multiplier
            } else {
                self.config.min_order.min_notional_multiplier
            };
            let min_quote_required = edge.min_total * multiplier;

            let leg_outcome = match edge.side {
                Side::Buy => simulate_buy(edge, snapshot, current_amount, min_quote_required),
                Side::Sell => simulate_sell(edge, snapshot, current_amount, min_quote_required),
            };

            let (leg, slippage) = match leg_outcome {
                Ok(pair) => pair,
                Err(reason) => {
                    return self.fail(
                        path_id,
                        assets,
                        starting_notional,
                        current_amount,
                        legs,
                        reason,
                        orderbook_views,
                        debug,
                    )
                }
            };

            current_amount = leg.output_amount;
            legs.push(leg);
            if current_amount <= 0.0 {
                return self.fail(
                    path_id,
                    assets,
                    starting_notional,
                    current_amount,
                    legs,
                    EvaluationRejection::NonPositiveOutput {
                        market_code: edges[idx].market_code.clone(),
                    }
                    .to_string(),
                    orderbook_views,
                    debug,
                );
            }
            total_slippage += slippage;

            if idx + 1 < edges.len() {
                let next_edge = &edges[idx + 1];
                let Some(next_snapshot) = snapshots.get(&next_edge.market_code) else {
                    return self.fail(
                        path_id,
                        assets,
                        starting_notional,
                        current_amount,
                        legs,
                        EvaluationRejection::MissingSnapshot {
                            market_code: next_edge.market_code.clone(),
                        }
                        .to_string(),
                        orderbook_views,
                        debug,
                    );
                };
                if !next_snapshot.is_valid() {
                    return self.fail(
                        path_id,
                        assets,
                        starting_notional,
                        current_amount,
                        legs,
                        EvaluationRejection::InvalidSnapshot {
                            market_code: next_edge.market_code.clone(),
                        }
                        .to_string(),
                        orderbook_views,
                        debug,
                    );
                }
                if !has_input_for_leg(
                    current_amount,
                    next_edge,
                    next_snapshot,
                    self.config.min_order.min_notional_multiplier,
                ) {
                    return self.fail(
                        path_id,
                        assets,
                        starting_notional,
                        current_amount,
                        legs,
                        EvaluationRejection::InputBelowMinimum {
                            market_code: next_edge.market_code.clone(),
                        }
                        .to_string(),
                        orderbook_views,
                        debug,
                    );
                }
            }
        }

        let delta_inst = current_amount / starting_notional - 1.0;
        let delta_vol = self.compute_vol_penalty(assets, sigma_by_asset);
        let extra_edge = self.extra_edge_requirement(assets);
        let min_profit = self.config.risk_model.min_profit_margin + extra_edge;
        let delta_final = delta_inst - delta_vol - total_slippage;

        let debug_record = debug.then(|| EvaluationDebug {
            path_id: path_id.to_string(),
            assets: assets.to_vec(),
            starting_amount: starting_notional,
            final_amount: current_amount,
            delta_inst,
            delta_vol,
            delta_slip: total_slippage,
            delta_final,
            reason: "evaluated".to_string(),
            legs: legs.clone(),
            orderbooks: orderbook_views,
        });

        if delta_final > min_profit {
            Evaluated {
                evaluation: Some(PathEvaluation {
                    path_id: path_id.to_string(),
                    starting_amount: starting_notional,
                    final_amount: current_amount,
                    delta_inst,
                    delta_vol,
                    delta_slip: total_slippage,
                    delta_final,
                    legs,
                }),
                debug: debug_record,
            }
        } else {
            Evaluated {
                evaluation: None,
                debug: debug_record,
            }
        }
    }

    fn compute_vol_penalty(&self, assets: &[String], sigma_by_asset: &HashMap<String, f64>) -> f64 {
        let anchor = &self.config.anchor;
        let sigma = assets
            .iter()
            .filter(|a| *a != anchor)
            .map(|a| sigma_by_asset.get(a).copied().unwrap_or(0.0))
            .fold(0.0_f64, f64::max);
        self.config.risk_model.vol_risk_multiplier * sigma
    }

    /// Maximum `extra_edge_required` over assets in the path. Conservative by
    /// design: one risky asset dominates rather than averaging out.
    fn extra_edge_requirement(&self, assets: &[String]) -> f64 {
        assets
            .iter()
            .filter_map(|a| self.config.tokens.get(a))
            .map(|t| t.extra_edge_required)
            .fold(0.0_f64, f64::max)
    }

    #[allow(clippy::too_many_arguments)]
    fn fail(
        &self,
        path_id: &str,
        assets: &[String],
        starting_notional: f64,
        current_amount: f64,
        legs: Vec<LegResult>,
        reason: String,
        orderbook_views: HashMap<String, OrderbookView>,
        debug: bool,
    ) -> Evaluated {
        let debug_record = debug.then(|| EvaluationDebug {
            path_id: path_id.to_string(),
            assets: assets.to_vec(),
            starting_amount: starting_notional,
            final_amount: current_amount,
            delta_inst: 0.0,
            delta_vol: 0.0,
            delta_slip: 0.0,
            delta_final: 0.0,
            reason,
            legs,
            orderbooks: orderbook_views,
        });
        Evaluated {
            evaluation: None,
            debug: debug_record,
        }
    }
}

/// True iff `amount_available` clears the min-notional-multiplier floor for
/// this leg's input side. Buy legs are sized in quote directly; sell legs
/// are sized in base and must be converted via the snapshot's best bid.
fn has_input_for_leg(
    amount_available: f64,
    edge: &MarketEdge,
    snapshot: &OrderbookSnapshot,
    min_notional_multiplier: f64,
) -> bool {
    let required = edge.min_total * min_notional_multiplier;
    if required <= 0.0 {
        return true;
    }
    match edge.side {
        Side::Buy => amount_available >= required,
        Side::Sell => match snapshot.best_bid() {
            Some(level) if level.price > 0.0 => amount_available * level.price >= required,
            _ => false,
        },
    }
}

fn capture_books(
    edges: &[MarketEdge],
    snapshots: &IndexMap<String, std::sync::Arc<OrderbookSnapshot>>,
    depth: usize,
) -> HashMap<String, OrderbookView> {
    let mut views = HashMap::new();
    for edge in edges {
        let Some(snapshot) = snapshots.get(&edge.market_code) else {
            continue;
        };
        views.insert(
            edge.market_code.clone(),
            OrderbookView {
                bids: snapshot
                    .bids
                    .iter()
                    .take(depth)
                    .map(|l| DepthLevel { price: l.price, size: l.size })
                    .collect(),
                asks: snapshot
                    .asks
                    .iter()
                    .take(depth)
                    .map(|l| DepthLevel { price: l.price, size: l.size })
                    .collect(),
            },
        );
    }
    views
}

/// Walks asks ascending, spending `quote_amount` of quote to acquire base.
fn simulate_buy(
    edge: &MarketEdge,
    snapshot: &OrderbookSnapshot,
    quote_amount: f64,
    min_quote_required: f64,
) -> Result<(LegResult, f64), String> {
    debug_assert!(quote_amount > 0.0);
    let mut remaining = quote_amount;
    let mut acquired = 0.0_f64;
    let mut spent = 0.0_f64;
    let mut depth_used = Vec::new();

    for level in &snapshot.asks {
        debug_assert!(level.price > 0.0, "zero-price level in {}", edge.market_code);
        if level.size <= 0.0 {
            continue;
        }
        let cost = level.price * level.size;
        if cost <= remaining {
            acquired += level.size;
            spent += cost;
            depth_used.push(DepthLevel { price: level.price, size: level.size });
            remaining -= cost;
        } else {
            let partial_size = remaining / level.price;
            acquired += partial_size;
            spent += remaining;
            depth_used.push(DepthLevel { price: level.price, size: partial_size });
            remaining = 0.0;
            break;
        }
    }

    if remaining > REMAINING_EPSILON || acquired <= 0.0 {
        return Err(EvaluationRejection::InsufficientAskDepth {
            market_code: edge.market_code.clone(),
        }
        .to_string());
    }
    if spent < min_quote_required {
        return Err(EvaluationRejection::NotionalBelowMinimum {
            market_code: edge.market_code.clone(),
        }
        .to_string());
    }
    let vwap = spent / acquired;
    if vwap <= 0.0 {
        return Err(EvaluationRejection::InvalidVwap {
            market_code: edge.market_code.clone(),
        }
        .to_string());
    }
    let effective_price = vwap * (1.0 + edge.fee_rate);
    let best_ask = snapshot.best_ask().map(|l| l.price).unwrap_or(0.0);
    let slippage = if best_ask > 0.0 {
        ((effective_price - best_ask) / best_ask).max(0.0)
    } else {
        0.0
    };

    Ok((
        LegResult {
            market_code: edge.market_code.clone(),
            side: Side::Buy,
            notional_quote: spent,
            effective_price,
            input_amount: quote_amount,
            output_amount: acquired,
            fee_rate: edge.fee_rate,
            depth_used,
        },
        slippage,
    ))
}

/// Walks bids descending, selling `base_amount` of base for quote proceeds.
fn simulate_sell(
    edge: &MarketEdge,
    snapshot: &OrderbookSnapshot,
    base_amount: f64,
    min_quote_required: f64,
) -> Result<(LegResult, f64), String> {
    debug_assert!(base_amount > 0.0);
    let mut remaining = base_amount;
    let mut proceeds = 0.0_f64;
    let mut depth_used = Vec::new();

    for level in &snapshot.bids {
        debug_assert!(level.price > 0.0, "zero-price level in {}", edge.market_code);
        if level.size <= 0.0 {
            continue;
        }
        if level.size <= remaining {
            proceeds += level.price * level.size;
            depth_used.push(DepthLevel { price: level.price, size: level.size });
            remaining -= level.size;
        } else {
            proceeds += level.price * remaining;
            depth_used.push(DepthLevel { price: level.price, size: remaining });
            remaining = 0.0;
            break;
        }
    }

    if remaining > REMAINING_EPSILON {
        return Err(EvaluationRejection::InsufficientBidDepth {
            market_code: edge.market_code.clone(),
        }
        .to_string());
    }
    if proceeds < min_quote_required {
        return Err(EvaluationRejection::NotionalBelowMinimum {
            market_code: edge.market_code.clone(),
        }
        .to_string());
    }
    let vwap = if base_amount > 0.0 { proceeds / base_amount } else { 0.0 };
    if vwap <= 0.0 {
        return Err(EvaluationRejection::InvalidVwap {
            market_code: edge.market_code.clone(),
        }
        .to_string());
    }
    let effective_price = vwap * (1.0 - edge.fee_rate);
    let best_bid = snapshot.best_bid().map(|l| l.price).unwrap_or(0.0);
    let slippage = if best_bid > 0.0 {
        ((best_bid - effective_price) / best_bid).max(0.0)
    } else {
        0.0
    };

    Ok((
        LegResult {
            market_code: edge.market_code.clone(),
            side: Side::Sell,
            notional_quote: proceeds,
            effective_price,
            input_amount: base_amount,
            output_amount: proceeds,
            fee_rate: edge.fee_rate,
            depth_used,
        },
        slippage,
    ))
}
