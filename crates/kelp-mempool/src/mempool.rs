use std::collections::{BTreeMap, HashMap, HashSet};

use crate::fee_estimation::{FeeBlockInfo, FeeEstimator, FeeMempoolInfo, MempoolInfo, MempoolItemInfo};
use crate::mempool_item::MempoolItem;
use kelp_protocol::Bytes32;

/// Why an item left the mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MempoolRemoveReason {
    /// displaced by a conflicting, better paying item
    Conflict,
    /// included in a block on the primary chain
    BlockInclusion,
    /// evicted to make room when the pool was full
    PoolFull,
    /// an assert-before time lock has passed
    Expired,
}

/// Fee-per-cost as a total-ordered map key. All values are finite (cost is
/// never zero for an admitted item).
#[derive(Debug, Clone, Copy)]
pub struct FeePerCost(pub f64);

impl PartialEq for FeePerCost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for FeePerCost {}

impl PartialOrd for FeePerCost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FeePerCost {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// The in-memory store of admitted items: a primary map by bundle id, a
/// fee-density ordering for block construction, and secondary indexes by
/// spent coin id and by puzzle hash. All indexes refer to live primary
/// entries.
pub struct Mempool {
    mempool_info: MempoolInfo,
    spends: HashMap<Bytes32, MempoolItem>,
    // fee_per_cost -> bundle ids with that density, in admission order
    sorted_spends: BTreeMap<FeePerCost, Vec<Bytes32>>,
    // the coin id each spend currently refers to -> bundle ids spending it
    removals: HashMap<Bytes32, Vec<Bytes32>>,
    // puzzle hashes of spent and created coins -> bundle ids
    by_puzzle_hash: HashMap<Bytes32, HashSet<Bytes32>>,
    // hints of created coins -> bundle ids
    by_hint: HashMap<Bytes32, HashSet<Bytes32>>,
    total_mempool_cost: u64,
    total_mempool_fees: u64,
    fee_estimator: FeeEstimator,
}

impl Mempool {
    pub fn new(mempool_info: MempoolInfo, fee_estimator: FeeEstimator) -> Self {
        Self {
            mempool_info,
            spends: HashMap::new(),
            sorted_spends: BTreeMap::new(),
            removals: HashMap::new(),
            by_puzzle_hash: HashMap::new(),
            by_hint: HashMap::new(),
            total_mempool_cost: 0,
            total_mempool_fees: 0,
            fee_estimator,
        }
    }

    pub fn mempool_info(&self) -> &MempoolInfo {
        &self.mempool_info
    }

    pub fn size(&self) -> usize {
        self.spends.len()
    }

    pub fn total_mempool_cost(&self) -> u64 {
        self.total_mempool_cost
    }

    pub fn total_mempool_fees(&self) -> u64 {
        self.total_mempool_fees
    }

    pub fn contains(&self, bundle_id: &Bytes32) -> bool {
        self.spends.contains_key(bundle_id)
    }

    pub fn get(&self, bundle_id: &Bytes32) -> Option<&MempoolItem> {
        self.spends.get(bundle_id)
    }

    pub fn all_item_ids(&self) -> Vec<Bytes32> {
        self.spends.keys().copied().collect()
    }

    /// Items in descending fee-per-cost order, ties in admission order. This
    /// is the order blocks are built in.
    pub fn items_by_fee_rate(&self) -> impl Iterator<Item = &MempoolItem> {
        self.sorted_spends
            .iter()
            .rev()
            .flat_map(|(_, ids)| ids.iter())
            .map(|id| &self.spends[id])
    }

    /// The bundle ids currently spending the given coin.
    pub fn items_with_coin_id(&self, coin_id: &Bytes32) -> Vec<Bytes32> {
        self.removals.get(coin_id).cloned().unwrap_or_default()
    }

    /// The bundle ids spending any of the given coins.
    pub fn items_by_spent_coin_ids(&self, coin_ids: &[Bytes32]) -> Vec<Bytes32> {
        let mut ret = Vec::new();
        let mut seen = HashSet::new();
        for coin_id in coin_ids {
            for id in self.items_with_coin_id(coin_id) {
                if seen.insert(id) {
                    ret.push(id);
                }
            }
        }
        ret
    }

    /// The bundle ids spending or creating coins with any of the given
    /// puzzle hashes. Hints of created coins are consulted when
    /// `include_hints` is set.
    pub fn items_by_puzzle_hashes(
        &self,
        puzzle_hashes: &[Bytes32],
        include_hints: bool,
    ) -> Vec<Bytes32> {
        let mut ret = Vec::new();
        let mut seen = HashSet::new();
        for ph in puzzle_hashes {
            if let Some(ids) = self.by_puzzle_hash.get(ph) {
                for id in ids {
                    if seen.insert(*id) {
                        ret.push(*id);
                    }
                }
            }
            if include_hints {
                if let Some(ids) = self.by_hint.get(ph) {
                    for id in ids {
                        if seen.insert(*id) {
                            ret.push(*id);
                        }
                    }
                }
            }
        }
        ret
    }

    pub fn at_full_capacity(&self, cost: u64) -> bool {
        self.total_mempool_cost + cost > self.mempool_info.max_size_in_cost
    }

    /// The minimum fee per cost a candidate of cost `cost` must exceed to be
    /// admitted right now: zero while there is head-room, otherwise the fee
    /// rate of the most expensive item that would have to be evicted to make
    /// room. Returns None when a candidate of this cost cannot fit at all.
    pub fn get_min_fee_rate(&self, cost: u64) -> Option<f64> {
        if !self.at_full_capacity(cost) {
            return Some(0.0);
        }

        let mut current_cost = self.total_mempool_cost;
        for (fee_per_cost, ids) in &self.sorted_spends {
            for id in ids {
                current_cost -= self.spends[id].cost();
                if current_cost + cost <= self.mempool_info.max_size_in_cost {
                    return Some(fee_per_cost.0);
                }
            }
        }
        None
    }

    fn fee_mempool_info(&self) -> FeeMempoolInfo {
        FeeMempoolInfo {
            mempool_info: self.mempool_info,
            current_mempool_cost: self.total_mempool_cost,
            current_mempool_fees: self.total_mempool_fees,
        }
    }

    fn item_info(item: &MempoolItem) -> MempoolItemInfo {
        MempoolItemInfo {
            cost: item.cost(),
            fee: item.fee,
            height_added_to_mempool: item.height_added_to_mempool,
        }
    }

    /// Add an item, evicting the lowest fee-per-cost items while the pool
    /// would exceed its capacity. Returns the evicted items.
    pub fn add_to_pool(&mut self, item: MempoolItem) -> Vec<MempoolItem> {
        let mut evicted = Vec::new();
        while self.at_full_capacity(item.cost()) {
            let Some((_, ids)) = self.sorted_spends.iter().next() else {
                break;
            };
            // the lowest fee-per-cost item, oldest first
            let to_remove = ids[0];
            evicted.extend(self.remove_from_pool(&[to_remove], MempoolRemoveReason::PoolFull));
        }

        let name = item.name();
        for (coin_id, spend) in &item.bundle_coin_spends {
            debug_assert!(spend.latest_singleton_coin.is_none());
            self.removals.entry(*coin_id).or_default().push(name);
            self.by_puzzle_hash
                .entry(spend.coin_spend.coin.puzzle_hash)
                .or_default()
                .insert(name);
        }
        for spend in &item.conds.spends {
            for (puzzle_hash, _, hint) in &spend.create_coin {
                self.by_puzzle_hash
                    .entry(*puzzle_hash)
                    .or_default()
                    .insert(name);
                if let Some(hint) = hint {
                    if let Ok(hint) = Bytes32::try_from(hint) {
                        self.by_hint.entry(hint).or_default().insert(name);
                    }
                }
            }
        }
        self.sorted_spends
            .entry(FeePerCost(item.fee_per_cost()))
            .or_default()
            .push(name);
        self.total_mempool_cost += item.cost();
        self.total_mempool_fees += item.fee;

        let info = self.fee_mempool_info();
        self.fee_estimator
            .add_mempool_item(info, &Self::item_info(&item));
        self.spends.insert(name, item);
        evicted
    }

    /// Remove the given items. Items removed for block inclusion are not
    /// reported to the fee estimator here; they are passed to `new_block`
    /// instead. Returns the removed items.
    pub fn remove_from_pool(
        &mut self,
        items: &[Bytes32],
        reason: MempoolRemoveReason,
    ) -> Vec<MempoolItem> {
        let mut removed = Vec::new();
        for name in items {
            let Some(item) = self.spends.remove(name) else {
                continue;
            };

            for spend in item.bundle_coin_spends.values() {
                let coin_id = spend.current_coin_id();
                if let Some(ids) = self.removals.get_mut(&coin_id) {
                    ids.retain(|id| id != name);
                    if ids.is_empty() {
                        self.removals.remove(&coin_id);
                    }
                }
                Self::unindex(&mut self.by_puzzle_hash, &spend.coin_spend.coin.puzzle_hash, name);
            }
            for spend in &item.conds.spends {
                for (puzzle_hash, _, hint) in &spend.create_coin {
                    Self::unindex(&mut self.by_puzzle_hash, puzzle_hash, name);
                    if let Some(hint) = hint {
                        if let Ok(hint) = Bytes32::try_from(hint) {
                            Self::unindex(&mut self.by_hint, &hint, name);
                        }
                    }
                }
            }

            let key = FeePerCost(item.fee_per_cost());
            if let Some(ids) = self.sorted_spends.get_mut(&key) {
                ids.retain(|id| id != name);
                if ids.is_empty() {
                    self.sorted_spends.remove(&key);
                }
            }
            self.total_mempool_cost -= item.cost();
            self.total_mempool_fees -= item.fee;
            removed.push(item);
        }

        if reason != MempoolRemoveReason::BlockInclusion {
            let info = self.fee_mempool_info();
            for item in &removed {
                self.fee_estimator
                    .remove_mempool_item(info, &Self::item_info(item));
            }
        }
        removed
    }

    fn unindex(
        index: &mut HashMap<Bytes32, HashSet<Bytes32>>,
        key: &Bytes32,
        name: &Bytes32,
    ) {
        if let Some(ids) = index.get_mut(key) {
            ids.remove(name);
            if ids.is_empty() {
                index.remove(key);
            }
        }
    }

    /// Re-point a fast-forward spend at the latest version of its singleton.
    pub fn rebase_spend(
        &mut self,
        bundle_id: &Bytes32,
        old_coin_id: &Bytes32,
        new_coin_id: Bytes32,
    ) {
        if let Some(ids) = self.removals.get_mut(old_coin_id) {
            ids.retain(|id| id != bundle_id);
            if ids.is_empty() {
                self.removals.remove(old_coin_id);
            }
        }
        self.removals.entry(new_coin_id).or_default().push(*bundle_id);

        if let Some(item) = self.spends.get_mut(bundle_id) {
            for spend in item.bundle_coin_spends.values_mut() {
                if spend.current_coin_id() == *old_coin_id {
                    spend.latest_singleton_coin = Some(new_coin_id);
                    break;
                }
            }
        }
    }

    /// Expire items whose assert-before locks have passed as of the new
    /// peak. Returns the expired items.
    pub fn expire_items(&mut self, height: u32, timestamp: u64) -> Vec<MempoolItem> {
        let expired: Vec<Bytes32> = self
            .spends
            .values()
            .filter(|item| {
                item.assert_before_height.is_some_and(|h| height >= h)
                    || item.assert_before_seconds.is_some_and(|s| timestamp >= s)
            })
            .map(MempoolItem::name)
            .collect();
        self.remove_from_pool(&expired, MempoolRemoveReason::Expired)
    }

    /// Forward a new transaction block to the fee estimator, with the items
    /// it included.
    pub fn new_block(&mut self, block_height: u32, included_items: Vec<MempoolItemInfo>) {
        self.fee_estimator.new_block(&FeeBlockInfo {
            block_height,
            included_items,
        });
    }

    pub fn fee_estimator(&self) -> &FeeEstimator {
        &self.fee_estimator
    }

    /// Tear the pool down for a reorg rebuild: returns all items in
    /// descending fee-per-cost order and leaves the pool empty.
    pub fn drain_for_rebuild(&mut self) -> Vec<MempoolItem> {
        let order: Vec<Bytes32> = self
            .sorted_spends
            .iter()
            .rev()
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        self.sorted_spends.clear();
        self.removals.clear();
        self.by_puzzle_hash.clear();
        self.by_hint.clear();
        self.total_mempool_cost = 0;
        self.total_mempool_fees = 0;
        let mut spends = std::mem::take(&mut self.spends);
        order
            .into_iter()
            .filter_map(|id| spends.remove(&id))
            .collect()
    }
}
