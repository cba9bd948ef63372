use std::sync::Arc;

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use parking_lot::RwLock;

/// A single resting order at a price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderbookLevel {
    pub price: f64,
    pub size: f64,
}

/// A whole-book view for one market at one exchange, published atomically.
/// Bids are strictly descending by price, asks strictly ascending; both are
/// guaranteed non-empty by `OrderbookCache::update`, which rejects updates
/// that would leave a side empty rather than publish a half-book.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderbookSnapshot {
    pub exchange: String,
    pub market: String,
    pub bids: Vec<OrderbookLevel>,
    pub asks: Vec<OrderbookLevel>,
    pub timestamp_ms: i64,
}

impl OrderbookSnapshot {
    pub fn best_bid(&self) -> Option<OrderbookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<OrderbookLevel> {
        self.asks.first().copied()
    }

    pub fn is_valid(&self) -> bool {
        !self.bids.is_empty()
            && !self.asks.is_empty()
            && self.best_bid().map(|l| l.price > 0.0).unwrap_or(false)
            && self.best_ask().map(|l| l.price > 0.0).unwrap_or(false)
    }
}

fn cache_key(exchange: &str, market: &str) -> String {
    if exchange.is_empty() {
        market.to_string()
    } else {
        format!("{exchange}::{market}")
    }
}

/// A market's published book, held behind an `ArcSwap` so publishing a new
/// snapshot never blocks a concurrent reader of the same key. Mirrors the
/// teacher's `TokenBookState::book` field in
/// `scrapers::polymarket_book_store`.
#[derive(Debug)]
struct BookSlot {
    snapshot: ArcSwap<OrderbookSnapshot>,
}

/// Concurrent snapshot store, single-writer-per-key / many-readers, with
/// atomic whole-book replacement. Readers always observe either the previous
/// snapshot in full or the new one in full, never a torn mix. A
/// `parking_lot::RwLock` guards only the *set of keys*; replacing an existing
/// key's snapshot is a lock-free `ArcSwap::store`, never held across an
/// `.await`. Only inserting a never-before-seen key takes the write lock,
/// same split as `BookStore::books`/`ensure_token` in the teacher.
#[derive(Debug, Default)]
pub struct OrderbookCache {
    books: RwLock<IndexMap<String, Arc<BookSlot>>>,
}

impl OrderbookCache {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(IndexMap::new()),
        }
    }

    /// Publishes a fresh book for `(exchange, market)`. Non-positive levels
    /// are filtered out; if either side ends up empty the update is dropped
    /// entirely (no torn or half-book publication). This performs a single,
    /// direct replacement — the original source's equivalent routine calls
    /// itself recursively on every update, which is a bug, not a design.
    pub fn update(
        &self,
        exchange: &str,
        market: &str,
        mut bids: Vec<OrderbookLevel>,
        mut asks: Vec<OrderbookLevel>,
        timestamp_ms: i64,
    ) {
        bids.retain(|l| l.price > 0.0 && l.size > 0.0);
        asks.retain(|l| l.price > 0.0 && l.size > 0.0);
        if bids.is_empty() || asks.is_empty() {
            return;
        }

        bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
        asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));

        let snapshot = Arc::new(OrderbookSnapshot {
            exchange: exchange.to_string(),
            market: market.to_string(),
            bids,
            asks,
            timestamp_ms,
        });

        let key = cache_key(exchange, market);

        // Fast path: key already has a slot, publish without taking the
        // write lock.
        if let Some(slot) = self.books.read().get(&key) {
            slot.snapshot.store(snapshot);
            return;
        }

        // Slow path: first time this key is seen, insert a new slot. Seeded
        // with an empty (invalid) placeholder in case of a race with another
        // writer for the same key; the `store` below always lands the real
        // snapshot regardless of which writer created the slot.
        let placeholder = OrderbookSnapshot {
            exchange: exchange.to_string(),
            market: market.to_string(),
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp_ms: 0,
        };
        self.books
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(BookSlot { snapshot: ArcSwap::from_pointee(placeholder) }))
            .snapshot
            .store(snapshot);
    }

    pub fn snapshot(&self, exchange: &str, market: &str) -> Option<Arc<OrderbookSnapshot>> {
        let slot = self.books.read().get(&cache_key(exchange, market))?.clone();
        let snap = slot.snapshot.load_full();
        if snap.is_valid() {
            Some(snap)
        } else {
            None
        }
    }

    /// Returns a snapshot for every market in `markets` that currently has
    /// one published; missing markets are simply absent from the result, not
    /// an error — callers must treat absence as "not yet warm."
    pub fn snapshot_many(
        &self,
        exchange: &str,
        markets: &[String],
    ) -> IndexMap<String, Arc<OrderbookSnapshot>> {
        let books = self.books.read();
        markets
            .iter()
            .filter_map(|m| {
                let slot = books.get(&cache_key(exchange, m))?;
                let snap = slot.snapshot.load_full();
                snap.is_valid().then_some((m.clone(), snap))
            })
            .collect()
    }

    pub fn has_data(&self) -> bool {
        self.books
            .read()
            .values()
            .any(|slot| slot.snapshot.load().is_valid())
    }

    pub fn markets(&self) -> Vec<String> {
        self.books.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: f64, size: f64) -> OrderbookLevel {
        OrderbookLevel { price, size }
    }

    #[test]
    fn update_then_read_round_trips() {
        let cache = OrderbookCache::new();
        cache.update("", "BTC-USD", vec![level(100.0, 1.0)], vec![level(101.0, 1.0)], 1);
        let snap = cache.snapshot("", "BTC-USD").expect("snapshot present");
        assert_eq!(snap.bids, vec![level(100.0, 1.0)]);
        assert_eq!(snap.asks, vec![level(101.0, 1.0)]);
    }

    #[test]
    fn update_sorts_and_filters_non_positive_levels() {
        let cache = OrderbookCache::new();
        cache.update(
            "",
            "BTC-USD",
            vec![level(99.0, 1.0), level(100.0, 1.0), level(-1.0, 5.0)],
            vec![level(103.0, 1.0), level(101.0, 1.0), level(102.0, 0.0)],
            1,
        );
        let snap = cache.snapshot("", "BTC-USD").unwrap();
        assert_eq!(snap.bids, vec![level(100.0, 1.0), level(99.0, 1.0)]);
        assert_eq!(snap.asks, vec![level(101.0, 1.0), level(103.0, 1.0)]);
    }

    #[test]
    fn update_dropping_one_side_empty_is_a_no_op() {
        let cache = OrderbookCache::new();
        cache.update("", "BTC-USD", vec![level(100.0, 1.0)], vec![level(101.0, 1.0)], 1);
        cache.update("", "BTC-USD", vec![], vec![level(101.0, 1.0)], 2);
        let snap = cache.snapshot("", "BTC-USD").unwrap();
        assert_eq!(snap.timestamp_ms, 1, "stale update must not replace a good book");
    }

    #[test]
    fn snapshot_many_skips_missing_markets() {
        let cache = OrderbookCache::new();
        cache.update("", "BTC-USD", vec![level(100.0, 1.0)], vec![level(101.0, 1.0)], 1);
        let result = cache.snapshot_many("", &["BTC-USD".to_string(), "ETH-USD".to_string()]);
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("BTC-USD"));
    }

    #[test]
    fn has_data_reflects_population() {
        let cache = OrderbookCache::new();
        assert!(!cache.has_data());
        cache.update("", "BTC-USD", vec![level(100.0, 1.0)], vec![level(101.0, 1.0)], 1);
        assert!(cache.has_data());
    }

    #[test]
    fn exchange_tag_distinguishes_otherwise_identical_markets() {
        let cache = OrderbookCache::new();
        cache.update("BIN", "BTC-USD", vec![level(100.0, 1.0)], vec![level(101.0, 1.0)], 1);
        cache.update("OKX", "BTC-USD", vec![level(200.0, 1.0)], vec![level(201.0, 1.0)], 1);
        assert_eq!(cache.snapshot("BIN", "BTC-USD").unwrap().bids[0].price, 100.0);
        assert_eq!(cache.snapshot("OKX", "BTC-USD").unwrap().bids[0].price, 200.0);
    }
}
