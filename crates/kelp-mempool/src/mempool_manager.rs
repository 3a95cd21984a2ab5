use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use linked_hash_map::LinkedHashMap;

use crate::coin_store::CoinStore;
use crate::fee_estimation::{FeeEstimator, FeeEstimatorConfig, FeeRate, MempoolInfo, MempoolItemInfo};
use crate::mempool::{Mempool, MempoolRemoveReason};
use crate::mempool_item::{BundleCoinSpend, MempoolItem};
use crate::pending_cache::PendingTxCache;
use crate::transactions_filter::TransactionsFilter;
use crate::validation_pool::ValidationPool;
use kelp_consensus::conditions::ELIGIBLE_FOR_FF;
use kelp_consensus::consensus_constants::ConsensusConstants;
use kelp_consensus::owned_conditions::OwnedSpendBundleConditions;
use kelp_consensus::pairing_cache::PairingCache;
use kelp_consensus::spendbundle_validation::validate_clvm_and_signature;
use kelp_consensus::validation_error::ErrorCode;
use kelp_protocol::{BlockRecord, Bytes32, Coin, CoinRecord, SpendBundle};

/// The outcome of offering a bundle to the mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MempoolInclusionStatus {
    /// added to the mempool
    Success,
    /// not added now, queued for retry on a later peak
    Pending,
    /// rejected, nothing retained
    Failed,
}

/// A bundle that made it out of the pending cache into the mempool on a new
/// peak.
#[derive(Debug, Clone)]
pub struct NewPeakItem {
    pub spend_bundle: Arc<SpendBundle>,
    pub conds: Arc<OwnedSpendBundleConditions>,
    pub spend_bundle_name: Bytes32,
}

type ValidationOutcome = Result<(MempoolItem, Vec<Bytes32>), (ErrorCode, Option<MempoolItem>)>;

/// The smallest absolute fee increase a replacement must pay over the items
/// it displaces: 0.0001 of the native unit.
pub const MIN_FEE_INCREASE: u64 = 10_000_000;

/// The orchestrator of the mempool: admission policy, replacement, capacity,
/// reorg handling and block construction. The node serializes all calls that
/// take `&mut self`; pre-validation runs on a worker pool and may be invoked
/// concurrently.
pub struct MempoolManager<C: CoinStore> {
    constants: ConsensusConstants,
    coin_store: C,

    /// The fee per cost must be above this amount to consider the fee
    /// "nonzero", and thus able to kick out other transactions. This
    /// prevents spam.
    nonzero_fee_minimum_fpc: u64,

    /// A single transaction may use at most this fraction of a block's cost
    /// budget
    limit_factor: f64,

    /// Transactions that were unable to enter the mempool, used for retry
    potential_cache: PendingTxCache,

    /// Keep track of seen spend bundles
    seen_bundle_hashes: LinkedHashMap<Bytes32, ()>,
    seen_cache_size: usize,

    fee_estimator_config: FeeEstimatorConfig,
    pool: ValidationPool,
    pairing_cache: Arc<PairingCache>,

    /// The mempool corresponds to a certain peak
    peak: Option<BlockRecord>,
    mempool: Mempool,
}

impl<C: CoinStore> MempoolManager<C> {
    pub fn new(
        coin_store: C,
        constants: ConsensusConstants,
        fee_estimator_config: FeeEstimatorConfig,
        single_threaded: bool,
    ) -> Self {
        let nonzero_fee_minimum_fpc = 5;
        let mempool_max_total_cost =
            constants.max_block_cost_clvm * u64::from(constants.mempool_block_buffer);
        let mempool_info = MempoolInfo {
            max_size_in_cost: mempool_max_total_cost,
            minimum_fee_per_cost_to_replace: FeeRate(nonzero_fee_minimum_fpc),
            max_block_clvm_cost: constants.max_block_cost_clvm,
        };
        let pool = if single_threaded {
            ValidationPool::inline()
        } else {
            ValidationPool::new(2)
        };
        Self {
            potential_cache: PendingTxCache::new(constants.max_block_cost_clvm),
            constants,
            coin_store,
            nonzero_fee_minimum_fpc,
            limit_factor: 0.5,
            seen_bundle_hashes: LinkedHashMap::new(),
            seen_cache_size: 10_000,
            fee_estimator_config,
            pool,
            pairing_cache: Arc::new(PairingCache::default()),
            peak: None,
            mempool: Mempool::new(
                mempool_info,
                FeeEstimator::create(fee_estimator_config, mempool_info),
            ),
        }
    }

    /// The cost budget a single transaction may use
    fn max_tx_clvm_cost(&self) -> u64 {
        (self.limit_factor * self.constants.max_block_cost_clvm as f64) as u64
    }

    pub fn peak(&self) -> Option<&BlockRecord> {
        self.peak.as_ref()
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn pairing_cache(&self) -> &Arc<PairingCache> {
        &self.pairing_cache
    }

    /// Run the CPU-heavy validation of a bundle (CLVM and aggregate
    /// signature) on the worker pool. Newly computed pairings end up in the
    /// shared pairing cache, which makes validating the full block cheaper
    /// later.
    pub async fn pre_validate_spend_bundle(
        &self,
        new_spend: SpendBundle,
        spend_name: Option<Bytes32>,
    ) -> Result<OwnedSpendBundleConditions, ErrorCode> {
        let start_time = Instant::now();
        let spend_name = spend_name.unwrap_or_else(|| new_spend.name());

        let constants = self.constants.clone();
        let max_cost = self.max_tx_clvm_cost();
        let height = self.peak.as_ref().map_or(0, |peak| peak.height);
        let cache = Arc::clone(&self.pairing_cache);

        let ret = self
            .pool
            .run(move || {
                validate_clvm_and_signature(&new_spend, max_cost, &constants, height, &cache)
            })
            .await;

        let duration = start_time.elapsed();
        if duration.as_secs() < 2 {
            log::debug!("pre_validate_spend_bundle took {duration:?} for {spend_name}");
        } else {
            log::warn!("pre_validate_spend_bundle took {duration:?} for {spend_name}");
        }
        ret
    }

    /// Validate and add a pre-validated bundle to the mempool. Conflicting
    /// resident items may be displaced if the new bundle qualifies under the
    /// replacement policy; recoverable failures park the bundle in the
    /// pending cache.
    pub async fn add_spend_bundle(
        &mut self,
        new_spend: Arc<SpendBundle>,
        conds: Arc<OwnedSpendBundleConditions>,
        spend_name: Bytes32,
    ) -> (Option<u64>, MempoolInclusionStatus, Option<ErrorCode>) {
        // Skip if already added
        if let Some(item) = self.mempool.get(&spend_name) {
            return (Some(item.cost()), MempoolInclusionStatus::Success, None);
        }

        match self.validate_spend_bundle(&new_spend, &conds, spend_name).await {
            Ok((item, remove_items)) => {
                let cost = item.cost();
                self.mempool.add_to_pool(item);
                self.mempool
                    .remove_from_pool(&remove_items, MempoolRemoveReason::Conflict);
                (Some(cost), MempoolInclusionStatus::Success, None)
            }
            Err((err, Some(item))) => {
                // we can't add this bundle yet, but it may become valid on a
                // later peak
                let cost = item.cost();
                self.potential_cache.add(item);
                (Some(cost), MempoolInclusionStatus::Pending, Some(err))
            }
            Err((err, None)) => (None, MempoolInclusionStatus::Failed, Some(err)),
        }
    }

    /// The admission pipeline. On success returns the item to add along with
    /// the conflicting items it displaces. On failure returns the error and,
    /// for recoverable failures, the item to park in the pending cache.
    async fn validate_spend_bundle(
        &self,
        new_spend: &Arc<SpendBundle>,
        conds: &Arc<OwnedSpendBundleConditions>,
        spend_name: Bytes32,
    ) -> ValidationOutcome {
        let start_time = Instant::now();
        let Some(peak) = &self.peak else {
            return Err((ErrorCode::MempoolNotInitialized, None));
        };
        let Some(peak_timestamp) = peak.timestamp else {
            return Err((ErrorCode::MempoolNotInitialized, None));
        };

        let cost = conds.cost;
        log::debug!("cost: {cost}");

        if cost > self.max_tx_clvm_cost() {
            // we shouldn't ever end up here, since the cost is limited when
            // we execute the CLVM program.
            return Err((ErrorCode::CostExceeded, None));
        }

        // the set of coins the conditions say are spent must be the set the
        // bundle declares. A mismatch means a puzzle reveal doesn't hash to
        // the coin's puzzle hash
        let removal_names: Vec<Bytes32> = conds.spends.iter().map(|s| s.coin_id).collect();
        let declared_names: HashSet<Bytes32> =
            new_spend.coin_spends.iter().map(|cs| cs.coin.coin_id()).collect();
        if removal_names.len() != declared_names.len()
            || removal_names.iter().any(|n| !declared_names.contains(n))
        {
            return Err((ErrorCode::InvalidSpendBundle, None));
        }

        let mut additions_dict: HashMap<Bytes32, Coin> = HashMap::new();
        let mut addition_amount: u128 = 0;
        for spend in &conds.spends {
            for coin in spend.additions() {
                if coin.amount > self.constants.max_coin_amount {
                    return Err((ErrorCode::CoinAmountExceedsMaximum, None));
                }
                addition_amount += u128::from(coin.amount);
                if additions_dict.insert(coin.coin_id(), coin).is_some() {
                    return Err((ErrorCode::DuplicateOutput, None));
                }
            }
        }

        // Check for duplicate inputs
        let mut seen_removals = HashSet::new();
        for name in &removal_names {
            if !seen_removals.insert(*name) {
                return Err((ErrorCode::DoubleSpend, None));
            }
        }

        // resolve all spent coins against the coin set. A missing record is
        // allowed only for coins created by this same bundle (ephemeral
        // spends), which are treated as confirmed in the next block
        let mut removal_record_dict: HashMap<Bytes32, CoinRecord> = HashMap::new();
        let mut removal_amount: u128 = 0;
        for name in &removal_names {
            let removal_record = match self.coin_store.get_coin_record(name).await {
                Some(record) => record,
                None => {
                    let Some(removal_coin) = additions_dict.get(name) else {
                        return Err((ErrorCode::UnknownUnspent, None));
                    };
                    // The timestamp and block-height of this coin being spent
                    // needs to be consistent with what we use to check
                    // time-lock conditions. All spends (including ephemeral
                    // coins) are spent simultaneously.
                    CoinRecord::new(*removal_coin, peak.height + 1, 0, false, peak_timestamp)
                }
            };
            removal_amount += u128::from(removal_record.coin.amount);
            removal_record_dict.insert(*name, removal_record);
        }

        if addition_amount > removal_amount {
            return Err((ErrorCode::MintingCoin, None));
        }
        let Ok(fees) = u64::try_from(removal_amount - addition_amount) else {
            return Err((ErrorCode::CoinAmountExceedsMaximum, None));
        };

        if fees < conds.reserve_fee {
            return Err((ErrorCode::ReserveFeeConditionFailed, None));
        }

        if cost == 0 {
            return Err((ErrorCode::Unknown, None));
        }

        let fees_per_cost = fees as f64 / cost as f64;

        // If the pool is at capacity check the fee, if not then accept even
        // without a fee
        if self.mempool.at_full_capacity(cost) {
            if fees_per_cost < self.nonzero_fee_minimum_fpc as f64 {
                return Err((ErrorCode::InvalidFeeTooCloseToZero, None));
            }
            let min_fee_rate = self.mempool.get_min_fee_rate(cost);
            if min_fee_rate.is_none_or(|min| fees_per_cost <= min) {
                // the pool is full, but head-room may open up later
                let item =
                    self.make_item(new_spend, conds, spend_name, fees, &removal_record_dict, peak);
                return Err((ErrorCode::InvalidFeeLowFee, Some(item)));
            }
        }

        // Check removals against the coin set and the resident items
        let (fail_reason, conflicts) = self.check_removals(&removal_record_dict);
        match fail_reason {
            Some(ErrorCode::MempoolConflict) | None => {}
            Some(err) => return Err((err, None)),
        }

        // Verify that the revealed puzzles actually match the puzzle hashes
        // the resolved coins carry
        for spend in &conds.spends {
            let coin_record = &removal_record_dict[&spend.coin_id];
            if spend.puzzle_hash != coin_record.coin.puzzle_hash {
                log::warn!(
                    "mempool rejecting transaction, wrong puzzle_hash: {} != {}",
                    spend.puzzle_hash,
                    coin_record.coin.puzzle_hash
                );
                return Err((ErrorCode::WrongPuzzleHash, None));
            }
        }

        // conditions evaluate against the previous transaction block
        let prev_tx_block_height = if peak.is_transaction_block() {
            peak.height
        } else {
            peak.prev_transaction_block_height
        };
        let tl_error = kelp_consensus::check_time_locks::check_time_locks(
            &removal_record_dict,
            conds,
            prev_tx_block_height,
            peak_timestamp,
        );

        let item = self.make_item(new_spend, conds, spend_name, fees, &removal_record_dict, peak);

        if let Some(tl_error) = tl_error {
            return match tl_error {
                // the chain has not reached the asserted height yet; the
                // bundle becomes valid by just waiting
                ErrorCode::AssertHeightAbsoluteFailed
                | ErrorCode::AssertHeightRelativeFailed => Err((tl_error, Some(item))),
                _ => Err((tl_error, None)),
            };
        }

        let mut conflicting_pool_items: Vec<Bytes32> = Vec::new();
        if fail_reason == Some(ErrorCode::MempoolConflict) {
            let mut seen = HashSet::new();
            for coin in &conflicts {
                for id in self.mempool.items_with_coin_id(&coin.coin_id()) {
                    if seen.insert(id) {
                        conflicting_pool_items.push(id);
                    }
                }
            }
            log::warn!("conflicting pool items: {}", conflicting_pool_items.len());
            let conflicting: Vec<&MempoolItem> = conflicting_pool_items
                .iter()
                .filter_map(|id| self.mempool.get(id))
                .collect();
            if !can_replace(&conflicting, &removal_record_dict, fees, fees_per_cost) {
                return Err((ErrorCode::MempoolConflict, Some(item)));
            }
        }

        let duration = start_time.elapsed();
        log::debug!(
            "add_spendbundle {spend_name} took {duration:?}. Cost: {cost} ({:.3}% of max block cost)",
            100.0 * cost as f64 / self.constants.max_block_cost_clvm as f64,
        );

        Ok((item, conflicting_pool_items))
    }

    /// Checks for double spends, unknown spends and conflicting transactions
    /// in the mempool. Returns the coins with conflicts, if any.
    fn check_removals(
        &self,
        removals: &HashMap<Bytes32, CoinRecord>,
    ) -> (Option<ErrorCode>, Vec<Coin>) {
        let mut conflicts: Vec<Coin> = Vec::new();

        for record in removals.values() {
            // 1. Checks if it's been spent already
            if record.spent() {
                return (Some(ErrorCode::DoubleSpend), vec![]);
            }
            // 2. Checks if there's a mempool conflict
            if !self
                .mempool
                .items_with_coin_id(&record.coin.coin_id())
                .is_empty()
            {
                conflicts.push(record.coin);
            }
        }

        if !conflicts.is_empty() {
            return (Some(ErrorCode::MempoolConflict), conflicts);
        }
        (None, vec![])
    }

    fn make_item(
        &self,
        new_spend: &Arc<SpendBundle>,
        conds: &Arc<OwnedSpendBundleConditions>,
        spend_name: Bytes32,
        fees: u64,
        removal_record_dict: &HashMap<Bytes32, CoinRecord>,
        peak: &BlockRecord,
    ) -> MempoolItem {
        let mut bundle_coin_spends = HashMap::new();
        for (coin_spend, spend) in new_spend.coin_spends.iter().zip(conds.spends.iter()) {
            // conds.spends is in coin-spend order, but don't rely on it
            let coin_id = coin_spend.coin.coin_id();
            let spend_conds = if spend.coin_id == coin_id {
                spend
            } else {
                match conds.spends.iter().find(|s| s.coin_id == coin_id) {
                    Some(s) => s,
                    None => continue,
                }
            };
            bundle_coin_spends.insert(
                coin_id,
                BundleCoinSpend {
                    coin_spend: coin_spend.clone(),
                    eligible_for_fast_forward: (spend_conds.flags & ELIGIBLE_FOR_FF) != 0,
                    additions: spend_conds.additions().collect(),
                    latest_singleton_coin: None,
                },
            );
        }

        // resolve the bundle's time locks into absolute bounds, used for
        // pending retries and expiry
        let mut assert_height: Option<u32> = if conds.height_absolute > 0 {
            Some(conds.height_absolute)
        } else {
            None
        };
        let mut assert_before_height = conds.before_height_absolute;
        let mut assert_before_seconds = conds.before_seconds_absolute;
        for spend in &conds.spends {
            let Some(record) = removal_record_dict.get(&spend.coin_id) else {
                continue;
            };
            if let Some(rel) = spend.height_relative {
                let h = record.confirmed_block_index + rel;
                assert_height = Some(assert_height.map_or(h, |cur| cur.max(h)));
            }
            if let Some(rel) = spend.before_height_relative {
                let h = record.confirmed_block_index + rel;
                assert_before_height = Some(assert_before_height.map_or(h, |cur| cur.min(h)));
            }
            if let Some(rel) = spend.before_seconds_relative {
                let s = record.timestamp + rel;
                assert_before_seconds = Some(assert_before_seconds.map_or(s, |cur| cur.min(s)));
            }
        }

        MempoolItem {
            spend_bundle: Arc::clone(new_spend),
            fee: fees,
            conds: Arc::clone(conds),
            spend_bundle_name: spend_name,
            height_added_to_mempool: peak.height,
            assert_height,
            assert_before_height,
            assert_before_seconds,
            bundle_coin_spends,
        }
    }

    /// Returns an aggregated spend bundle that can be used for creating a new
    /// block, along with its additions and removals. The walk is greedy by
    /// fee density and stops at the first item that would exceed the block's
    /// cost budget or overflow the fee sum.
    pub fn create_bundle_from_mempool(
        &self,
        last_tb_header_hash: Bytes32,
    ) -> Option<(SpendBundle, Vec<Coin>, Vec<Coin>)> {
        let peak = self.peak.as_ref()?;
        if peak.header_hash != last_tb_header_hash {
            return None;
        }

        let cost_budget = self.max_tx_clvm_cost();
        let mut cost_sum = 0_u64; // Checks that total cost does not exceed block maximum
        let mut fee_sum = 0_u64; // Checks that total fees don't exceed 64 bits
        let mut spend_bundles: Vec<SpendBundle> = Vec::new();
        let mut removals: Vec<Coin> = Vec::new();
        let mut additions: Vec<Coin> = Vec::new();

        log::info!(
            "Starting to make block, max cost: {}",
            self.constants.max_block_cost_clvm
        );
        for item in self.mempool.items_by_fee_rate() {
            log::debug!(
                "Cumulative cost: {cost_sum}, fee per cost: {:.2}",
                item.fee_per_cost()
            );
            if item.cost() + cost_sum > cost_budget
                || item.fee.checked_add(fee_sum).is_none_or(|total| {
                    total > self.constants.max_coin_amount
                })
            {
                break;
            }
            cost_sum += item.cost();
            fee_sum += item.fee;
            spend_bundles.push((*item.spend_bundle).clone());
            removals.extend(item.removals());
            additions.extend(item.additions());
        }

        if spend_bundles.is_empty() {
            return None;
        }
        log::info!(
            "Cumulative cost of block (real cost should be less) {cost_sum}. Proportion \
             full: {:.3}",
            cost_sum as f64 / self.constants.max_block_cost_clvm as f64
        );
        let agg = SpendBundle::aggregate(&spend_bundles);
        Some((agg, additions, removals))
    }

    /// Called when a new transaction-block peak is available. We either patch
    /// the mempool in place (when the new peak extends the previous one and
    /// its conditions are known) or rebuild it by re-admitting every resident
    /// item. Returns the bundles newly admitted from the pending cache.
    pub async fn new_peak(
        &mut self,
        new_peak: &BlockRecord,
        last_block_conds: Option<&OwnedSpendBundleConditions>,
    ) -> Vec<NewPeakItem> {
        if !new_peak.is_transaction_block() {
            return vec![];
        }
        let Some(new_peak_timestamp) = new_peak.timestamp else {
            return vec![];
        };
        if self
            .peak
            .as_ref()
            .is_some_and(|peak| peak.header_hash == new_peak.header_hash)
        {
            return vec![];
        }

        let mut included_items: Vec<MempoolItemInfo> = Vec::new();

        let use_optimization = self.peak.as_ref().is_some_and(|peak| {
            new_peak.prev_transaction_block_hash == Some(peak.header_hash)
        });
        self.peak = Some(new_peak.clone());

        if let (true, Some(block_conds)) = (use_optimization, last_block_conds) {
            // We don't rebuild the mempool, just kick the items whose coins
            // were spent by this block. Fast-forward spends of a spent
            // singleton are re-pointed at its latest version instead.
            for spend in &block_conds.spends {
                for id in self.mempool.items_with_coin_id(&spend.coin_id) {
                    let Some(item) = self.mempool.get(&id) else {
                        continue;
                    };
                    let fast_forward = item
                        .bundle_coin_spends
                        .values()
                        .find(|bcs| bcs.current_coin_id() == spend.coin_id)
                        .is_some_and(|bcs| bcs.eligible_for_fast_forward);

                    if fast_forward {
                        let lineage = self
                            .coin_store
                            .get_unspent_lineage_info_for_puzzle_hash(&spend.puzzle_hash)
                            .await;
                        if let Some(lineage) = lineage {
                            self.mempool.rebase_spend(&id, &spend.coin_id, lineage.coin_id);
                            continue;
                        }
                        // the singleton has no unspent successor; fall
                        // through and drop the item
                    }

                    let removed = self
                        .mempool
                        .remove_from_pool(&[id], MempoolRemoveReason::BlockInclusion);
                    for item in removed {
                        included_items.push(MempoolItemInfo {
                            cost: item.cost(),
                            fee: item.fee,
                            height_added_to_mempool: item.height_added_to_mempool,
                        });
                        self.remove_seen(&item.name());
                    }
                }
            }
        } else {
            // a reorg, or we don't know what the block spent: re-admit every
            // resident item against the new chain state, best payers first
            let mempool_info = *self.mempool.mempool_info();
            let mut old_pool = std::mem::replace(
                &mut self.mempool,
                Mempool::new(
                    mempool_info,
                    FeeEstimator::create(self.fee_estimator_config, mempool_info),
                ),
            );
            self.seen_bundle_hashes.clear();
            for item in old_pool.drain_for_rebuild() {
                let (_, status, err) = self
                    .add_spend_bundle(
                        Arc::clone(&item.spend_bundle),
                        Arc::clone(&item.conds),
                        item.spend_bundle_name,
                    )
                    .await;
                // Only add to `seen` if inclusion worked, so it can be
                // resubmitted in case of a reorg
                if status == MempoolInclusionStatus::Success {
                    self.add_and_maybe_pop_seen(item.spend_bundle_name);
                }
                // If the bundle was confirmed or is now conflicting it can no
                // longer be in the mempool. A double spend against the new
                // chain means the item was most likely included in a block.
                if status == MempoolInclusionStatus::Failed && err == Some(ErrorCode::DoubleSpend)
                {
                    included_items.push(MempoolItemInfo {
                        cost: item.cost(),
                        fee: item.fee,
                        height_added_to_mempool: item.height_added_to_mempool,
                    });
                }
            }
        }

        // items whose assert-before locks have now passed can never be valid
        // again
        let expired = self
            .mempool
            .expire_items(new_peak.height, new_peak_timestamp);
        for item in &expired {
            self.remove_seen(&item.name());
        }

        // retry everything that was waiting for a new peak
        let potential_txs = self.potential_cache.drain();
        let mut txs_added = Vec::new();
        for item in potential_txs {
            let (_, status, _) = self
                .add_spend_bundle(
                    Arc::clone(&item.spend_bundle),
                    Arc::clone(&item.conds),
                    item.spend_bundle_name,
                )
                .await;
            if status == MempoolInclusionStatus::Success {
                txs_added.push(NewPeakItem {
                    spend_bundle: item.spend_bundle,
                    conds: item.conds,
                    spend_bundle_name: item.spend_bundle_name,
                });
            }
        }

        log::info!(
            "Size of mempool: {} spends, cost: {}, minimum fee rate (in FPC) to get in \
             for 5M cost tx: {:.2}",
            self.mempool.size(),
            self.mempool.total_mempool_cost(),
            self.mempool.get_min_fee_rate(5_000_000).unwrap_or(f64::INFINITY),
        );
        self.mempool.new_block(new_peak.height, included_items);
        txs_added
    }

    /// Returns a full spend bundle if it's in the mempool
    pub fn get_spendbundle(&self, bundle_hash: &Bytes32) -> Option<Arc<SpendBundle>> {
        self.mempool
            .get(bundle_hash)
            .map(|item| Arc::clone(&item.spend_bundle))
    }

    pub fn get_mempool_item(&self, bundle_hash: &Bytes32) -> Option<&MempoolItem> {
        self.mempool.get(bundle_hash)
    }

    pub fn items_by_spent_coin_ids(&self, coin_ids: &[Bytes32]) -> Vec<Bytes32> {
        self.mempool.items_by_spent_coin_ids(coin_ids)
    }

    pub fn items_by_puzzle_hashes(
        &self,
        puzzle_hashes: &[Bytes32],
        include_hints: bool,
    ) -> Vec<Bytes32> {
        self.mempool.items_by_puzzle_hashes(puzzle_hashes, include_hints)
    }

    /// Return true if we saw this spend bundle recently
    pub fn seen(&self, bundle_hash: &Bytes32) -> bool {
        self.seen_bundle_hashes.contains_key(bundle_hash)
    }

    pub fn add_and_maybe_pop_seen(&mut self, spend_name: Bytes32) {
        self.seen_bundle_hashes.insert(spend_name, ());
        while self.seen_bundle_hashes.len() > self.seen_cache_size {
            self.seen_bundle_hashes.pop_front();
        }
    }

    pub fn remove_seen(&mut self, bundle_hash: &Bytes32) {
        self.seen_bundle_hashes.remove(bundle_hash);
    }

    /// A compact set filter over all resident bundle ids
    pub fn get_filter(&self) -> Vec<u8> {
        let ids = self.mempool.all_item_ids();
        TransactionsFilter::new(&ids).to_bytes()
    }

    /// The `limit` best-paying items the given filter reports absent
    pub fn get_items_not_in_filter(
        &self,
        filter: &TransactionsFilter,
        limit: usize,
    ) -> Vec<&MempoolItem> {
        let mut items = Vec::new();
        for item in self.mempool.items_by_fee_rate() {
            if items.len() == limit {
                break;
            }
            if filter.matches(&item.spend_bundle_name) {
                continue;
            }
            items.push(item);
        }
        items
    }

    /// A snapshot of the mempool's parameters and fill level
    pub fn get_mempool_info(&self) -> crate::fee_estimation::FeeMempoolInfo {
        crate::fee_estimation::FeeMempoolInfo {
            mempool_info: *self.mempool.mempool_info(),
            current_mempool_cost: self.mempool.total_mempool_cost(),
            current_mempool_fees: self.mempool.total_mempool_fees(),
        }
    }

    /// Determines whether the mempool can accept a transaction with the
    /// given fee and cost right now.
    pub fn is_fee_enough(&self, fees: u64, cost: u64) -> bool {
        if cost == 0 {
            return false;
        }
        let fees_per_cost = fees as f64 / cost as f64;
        if !self.mempool.at_full_capacity(cost) {
            return true;
        }
        fees_per_cost >= self.nonzero_fee_minimum_fpc as f64
            && self
                .mempool
                .get_min_fee_rate(cost)
                .is_some_and(|min| fees_per_cost > min)
    }
}

/// The replacement policy: an incoming item may displace conflicting items
/// iff it spends a superset of all their coins, pays a strictly higher
/// aggregate fee rate, and increases the absolute fee by at least the
/// minimum increment.
fn can_replace(
    conflicting_items: &[&MempoolItem],
    removals: &HashMap<Bytes32, CoinRecord>,
    fees: u64,
    fees_per_cost: f64,
) -> bool {
    let mut conflicting_fees = 0_u64;
    let mut conflicting_cost = 0_u64;
    for item in conflicting_items {
        conflicting_fees += item.fee;
        conflicting_cost += item.cost();

        // All coins spent in the conflicting items must also be spent in the
        // new item (superset rule). Otherwise there exists an attack: a user
        // spends coin A, an attacker replaces the bundle with AB at a higher
        // fee, then replaces AB with just B, kicking out A altogether.
        for spend in item.bundle_coin_spends.values() {
            let coin_id = spend.current_coin_id();
            if !removals.contains_key(&coin_id) {
                log::debug!(
                    "Rejecting conflicting tx as it does not spend conflicting coin {coin_id}"
                );
                return false;
            }
        }
    }

    // The new item must have a higher fee per cost than the aggregate of
    // everything it displaces
    let conflicting_fees_per_cost = conflicting_fees as f64 / conflicting_cost as f64;
    if fees_per_cost <= conflicting_fees_per_cost {
        log::debug!(
            "Rejecting conflicting tx due to not increasing fees per cost \
             ({fees_per_cost} <= {conflicting_fees_per_cost})"
        );
        return false;
    }

    // The new item must increase the total fee by at least a fixed amount
    let fee_increase = fees.saturating_sub(conflicting_fees);
    if fee_increase < MIN_FEE_INCREASE {
        log::debug!("Rejecting conflicting tx due to low fee increase ({fee_increase})");
        return false;
    }

    log::info!(
        "Replacing conflicting tx in mempool. New tx fee: {fees}, old tx fees: {conflicting_fees}"
    );
    true
}
