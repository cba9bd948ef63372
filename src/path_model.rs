use std::collections::HashSet;

use crate::config::AppConfig;
use crate::market_graph::{MarketEdge, MarketGraph};

/// A closed cycle rooted at the configured anchor asset.
#[derive(Debug, Clone)]
pub struct PathDefinition {
    pub path_id: String,
    pub edges: Vec<MarketEdge>,
    pub assets: Vec<String>,
}

/// Static, eagerly-enumerated set of admissible cycles over a `MarketGraph`.
/// Enumeration happens once at construction; the result never changes for a
/// given graph and config.
#[derive(Debug, Clone)]
pub struct PathModel {
    paths: Vec<PathDefinition>,
}

impl PathModel {
    pub fn build(graph: &MarketGraph, config: &AppConfig) -> Self {
        let mut builder = Builder {
            graph,
            config,
            next_id: 1,
            paths: Vec::new(),
        };
        builder.enumerate();
        PathModel {
            paths: builder.paths,
        }
    }

    pub fn paths(&self) -> &[PathDefinition] {
        &self.paths
    }

    /// Every distinct asset (anchor included) appearing in any enumerated
    /// path, in first-seen order. Used by the scanner to batch a single
    /// `VolatilityCache::snapshot_sigmas` call per pass instead of one per
    /// path.
    pub fn assets_in_use(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut assets = Vec::new();
        for path in &self.paths {
            for asset in &path.assets {
                if seen.insert(asset.clone()) {
                    assets.push(asset.clone());
                }
            }
        }
        assets
    }

    /// Every distinct market code referenced by any enumerated path.
    pub fn markets_in_use(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut markets = Vec::new();
        for path in &self.paths {
            for edge in &path.edges {
                if seen.insert(edge.market_code.clone()) {
                    markets.push(edge.market_code.clone());
                }
            }
        }
        markets
    }
}

struct Builder<'a> {
    graph: &'a MarketGraph,
    config: &'a AppConfig,
    next_id: u64,
    paths: Vec<PathDefinition>,
}

impl<'a> Builder<'a> {
    fn enumerate(&mut self) {
        let anchor = self.config.anchor.clone();
        let mut visited = HashSet::new();
        visited.insert(anchor.clone());
        self.dfs(&anchor, Vec::new(), vec![anchor.clone()], &mut visited, false);
    }

    /// Depth-first walk. `must_return_to_anchor` forces the next edge taken
    /// to land back on the anchor — set once a terminal-but-not-bridge asset
    /// has been entered, since such a node may only be a one-hop excursion.
    fn dfs(
        &mut self,
        current: &str,
        edges: Vec<MarketEdge>,
        assets: Vec<String>,
        visited: &mut HashSet<String>,
        must_return_to_anchor: bool,
    ) {
        for edge in self.graph.out_edges(current).to_vec() {
            let next_asset = edge.to_asset.clone();
            let anchor = &self.config.anchor;

            if must_return_to_anchor && &next_asset != anchor {
                continue;
            }

            if &next_asset != anchor {
                let rule = self.config.token_rule(&next_asset);
                if !rule.enabled || !(rule.allowed_as_bridge || rule.allowed_as_terminal_asset) {
                    continue;
                }
                if !self.config.paths.allow_revisit_nodes
                    && visited.contains(&next_asset)
                {
                    continue;
                }
            }

            let mut next_edges = edges.clone();
            next_edges.push(edge.clone());
            let mut next_assets = assets.clone();
            next_assets.push(next_asset.clone());

            if &next_asset == anchor {
                if next_edges.len() >= self.config.paths.min_length {
                    self.emit(next_edges, next_assets);
                }
                continue;
            }

            if next_edges.len() >= self.config.paths.max_length {
                continue;
            }

            let rule = self.config.token_rule(&next_asset);
            let require_return = !rule.allowed_as_bridge;

            let mut next_visited = visited.clone();
            next_visited.insert(next_asset.clone());

            self.dfs(&next_asset, next_edges, next_assets, &mut next_visited, require_return);
        }
    }

    fn emit(&mut self, edges: Vec<MarketEdge>, assets: Vec<String>) {
        let path_id = format!("path_{}", self.next_id);
        self.next_id += 1;
        self.paths.push(PathDefinition {
            path_id,
            edges,
            assets,
        });
    }
}
