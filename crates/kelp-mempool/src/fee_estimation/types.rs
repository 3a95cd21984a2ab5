/// A fee rate in base units per single cost unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeeRate(pub u64);

/// The information the fee estimator is passed for each mempool item that's
/// added, removed from the mempool or included in blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MempoolItemInfo {
    pub cost: u64,
    pub fee: u64,
    pub height_added_to_mempool: u32,
}

impl MempoolItemInfo {
    pub fn fee_per_cost(&self) -> f64 {
        self.fee as f64 / self.cost as f64
    }

    /// The fee rate in the tracker's bucket domain (per 1000 cost units).
    pub fn fee_per_k_cost(&self) -> f64 {
        self.fee_per_cost() * 1000.0
    }
}

/// Constant parameters of the mempool the estimator observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MempoolInfo {
    /// Maximum capacity of the mempool, in total CLVM cost
    pub max_size_in_cost: u64,
    /// Smallest fee-per-cost that might be accepted to replace another bundle
    pub minimum_fee_per_cost_to_replace: FeeRate,
    /// Max allowed cost of a block
    pub max_block_clvm_cost: u64,
}

/// A snapshot of the mempool's fill level, taken whenever an item is added
/// or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeMempoolInfo {
    pub mempool_info: MempoolInfo,
    /// Current sum of CLVM cost of all bundles in the mempool
    pub current_mempool_cost: u64,
    /// Sum of fees of all bundles waiting in the mempool
    pub current_mempool_fees: u64,
}

/// Information from the blockchain needed to estimate fees.
#[derive(Debug, Clone)]
pub struct FeeBlockInfo {
    pub block_height: u32,
    pub included_items: Vec<MempoolItemInfo>,
}
