use std::collections::HashMap;
use std::sync::Arc;

use kelp_consensus::owned_conditions::OwnedSpendBundleConditions;
use kelp_protocol::{Bytes32, Coin, CoinSpend, SpendBundle};

/// Per-spend bookkeeping between the bundle and its parsed conditions.
#[derive(Debug, Clone)]
pub struct BundleCoinSpend {
    pub coin_spend: CoinSpend,
    pub eligible_for_fast_forward: bool,
    pub additions: Vec<Coin>,
    /// if this spend is eligible for fast forward, this may be set to the
    /// current unspent coin belonging to this singleton, the coin we would
    /// rebase this spend on top of if we were to make a block now. When
    /// finding items by coin id, this coin id is used when set.
    pub latest_singleton_coin: Option<Bytes32>,
}

impl BundleCoinSpend {
    /// The coin id this spend currently refers to.
    pub fn current_coin_id(&self) -> Bytes32 {
        self.latest_singleton_coin
            .unwrap_or_else(|| self.coin_spend.coin.coin_id())
    }
}

/// An admitted transaction, resident in the mempool.
#[derive(Debug, Clone)]
pub struct MempoolItem {
    pub spend_bundle: Arc<SpendBundle>,
    pub fee: u64,
    pub conds: Arc<OwnedSpendBundleConditions>,
    pub spend_bundle_name: Bytes32,
    pub height_added_to_mempool: u32,

    /// If present, this bundle is not valid at or before this height
    pub assert_height: Option<u32>,
    /// If present, this bundle is no longer valid once the block height or
    /// timestamp reaches the specified value
    pub assert_before_height: Option<u32>,
    pub assert_before_seconds: Option<u64>,

    /// Map of (original) spent coin id to the spend's bookkeeping data
    pub bundle_coin_spends: HashMap<Bytes32, BundleCoinSpend>,
}

impl MempoolItem {
    pub fn name(&self) -> Bytes32 {
        self.spend_bundle_name
    }

    pub fn cost(&self) -> u64 {
        self.conds.cost
    }

    pub fn fee_per_cost(&self) -> f64 {
        self.fee as f64 / self.cost() as f64
    }

    /// The coins this bundle creates.
    pub fn additions(&self) -> Vec<Coin> {
        self.conds
            .spends
            .iter()
            .flat_map(|spend| spend.additions())
            .collect()
    }

    /// The coins this bundle spends.
    pub fn removals(&self) -> Vec<Coin> {
        self.spend_bundle
            .coin_spends
            .iter()
            .map(|cs| cs.coin)
            .collect()
    }
}
