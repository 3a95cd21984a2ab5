use linked_hash_map::LinkedHashMap;

use crate::mempool_item::MempoolItem;
use kelp_protocol::Bytes32;

/// Bundles that could not enter the mempool for a recoverable reason
/// (a height not yet reached, a mempool conflict, a fee below the current
/// floor). They are re-attempted on every new peak. The cache is bounded by
/// the cumulative CLVM cost of its entries; the oldest entries are dropped
/// first when it overflows.
#[derive(Debug)]
pub struct PendingTxCache {
    cache_max_total_cost: u64,
    cache_cost: u64,
    txs: LinkedHashMap<Bytes32, MempoolItem>,
}

impl PendingTxCache {
    pub fn new(cache_max_total_cost: u64) -> Self {
        Self {
            cache_max_total_cost,
            cache_cost: 0,
            txs: LinkedHashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn cost(&self) -> u64 {
        self.cache_cost
    }

    pub fn add(&mut self, item: MempoolItem) {
        if let Some(prev) = self.txs.insert(item.name(), item.clone()) {
            self.cache_cost -= prev.cost();
        }
        self.cache_cost += item.cost();

        while self.cache_cost > self.cache_max_total_cost {
            let Some((_, evicted)) = self.txs.pop_front() else {
                break;
            };
            self.cache_cost -= evicted.cost();
        }
    }

    /// Take all queued items, in insertion order, leaving the cache empty.
    pub fn drain(&mut self) -> Vec<MempoolItem> {
        self.cache_cost = 0;
        let txs = std::mem::take(&mut self.txs);
        txs.into_iter().map(|(_, item)| item).collect()
    }
}
