use crate::fee_estimation::fee_tracker::{EstimateResult, FeeTracker};
use crate::fee_estimation::types::{FeeBlockInfo, FeeMempoolInfo, FeeRate, MempoolItemInfo, MempoolInfo};

/// Selects the fee estimator variant the mempool is created with. The
/// mempool re-creates its estimator from this on a reorg rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeEstimatorConfig {
    /// The confirmation-latency tracking estimator
    BitcoinCore,
    /// Always estimate the given fee rate
    Fixed(FeeRate),
    /// No estimates (always zero), no tracking
    Null,
}

/// Translates fee tracker state plus a target time into a fee rate
/// prediction.
struct SmartFeeEstimator;

impl SmartFeeEstimator {
    /// Turn a tracker estimate into a fee rate. When the tracker found no
    /// passing bucket range, suggest one bucket above the lowest failing
    /// bucket.
    fn parse(tracker: &FeeTracker, result: &EstimateResult) -> f64 {
        if result.median != -1.0 {
            return result.median;
        }

        if result.fail_bucket.start == 0.0 {
            return -1.0;
        }

        // get_bucket_index returns the bucket left of the rate and the fail
        // bucket's start is already one edge down, thus +3 to suggest one
        // bucket above the lowest failing bucket
        let max_val = tracker.buckets().len() - 1;
        let start_index =
            (tracker.get_bucket_index(result.fail_bucket.start) + 3).min(max_val);

        tracker.buckets()[start_index]
    }

    fn fee_rate_for(tracker: &FeeTracker, result: &EstimateResult) -> FeeRate {
        let fee = Self::parse(tracker, result);
        if fee == -1.0 {
            FeeRate(0)
        } else {
            // convert from base units per 1000 cost to base units per cost
            FeeRate((fee / 1000.0) as u64)
        }
    }
}

pub struct BitcoinCoreStyle {
    tracker: FeeTracker,
    last_mempool_info: FeeMempoolInfo,
}

/// The fee estimator the mempool dispatches its events to.
pub enum FeeEstimator {
    BitcoinCore(Box<BitcoinCoreStyle>),
    Fixed(FeeRate),
    Null,
}

impl FeeEstimator {
    pub fn create(config: FeeEstimatorConfig, mempool_info: MempoolInfo) -> Self {
        match config {
            FeeEstimatorConfig::BitcoinCore => Self::BitcoinCore(Box::new(BitcoinCoreStyle {
                tracker: FeeTracker::new(),
                last_mempool_info: FeeMempoolInfo {
                    mempool_info,
                    current_mempool_cost: 0,
                    current_mempool_fees: 0,
                },
            })),
            FeeEstimatorConfig::Fixed(rate) => Self::Fixed(rate),
            FeeEstimatorConfig::Null => Self::Null,
        }
    }

    /// A new transaction block was added to the chain, with the given items
    /// from our mempool included in it.
    pub fn new_block(&mut self, block_info: &FeeBlockInfo) {
        if let Self::BitcoinCore(e) = self {
            e.tracker
                .process_block(block_info.block_height, &block_info.included_items);
        }
    }

    pub fn add_mempool_item(&mut self, info: FeeMempoolInfo, item: &MempoolItemInfo) {
        if let Self::BitcoinCore(e) = self {
            e.last_mempool_info = info;
            e.tracker.add_tx(item);
        }
    }

    pub fn remove_mempool_item(&mut self, info: FeeMempoolInfo, item: &MempoolItemInfo) {
        if let Self::BitcoinCore(e) = self {
            e.last_mempool_info = info;
            e.tracker.remove_tx(item);
        }
    }

    /// The predicted fee rate required to be included within the given time
    /// window. Zero when there is not enough data.
    pub fn estimate_fee_rate(&self, time_offset_seconds: u64) -> FeeRate {
        match self {
            Self::BitcoinCore(e) => {
                let result = e.tracker.estimate_fee(time_offset_seconds);
                SmartFeeEstimator::fee_rate_for(&e.tracker, &result)
            }
            Self::Fixed(rate) => *rate,
            Self::Null => FeeRate(0),
        }
    }

    pub fn estimate_fee_rate_for_block(&self, block: u32) -> FeeRate {
        match self {
            Self::BitcoinCore(e) => {
                let result = e.tracker.estimate_fee_for_block(block);
                SmartFeeEstimator::fee_rate_for(&e.tracker, &result)
            }
            Self::Fixed(rate) => *rate,
            Self::Null => FeeRate(0),
        }
    }

    /// The estimates for the short, medium and long horizons, as fee rates.
    /// Entries are zero when there is not enough data.
    pub fn estimate_fee_rates(&self) -> (FeeRate, FeeRate, FeeRate) {
        match self {
            Self::BitcoinCore(e) => {
                let (short, med, long) = e.tracker.estimate_fees();
                (
                    SmartFeeEstimator::fee_rate_for(&e.tracker, &short),
                    SmartFeeEstimator::fee_rate_for(&e.tracker, &med),
                    SmartFeeEstimator::fee_rate_for(&e.tracker, &long),
                )
            }
            Self::Fixed(rate) => (*rate, *rate, *rate),
            Self::Null => (FeeRate(0), FeeRate(0), FeeRate(0)),
        }
    }

    /// Last observed mempool fill level, in cost
    pub fn mempool_size(&self) -> u64 {
        match self {
            Self::BitcoinCore(e) => e.last_mempool_info.current_mempool_cost,
            _ => 0,
        }
    }

    /// For tests and diagnostics of the tracking estimator
    pub fn tracker(&self) -> Option<&FeeTracker> {
        match self {
            Self::BitcoinCore(e) => Some(&e.tracker),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mempool_info() -> MempoolInfo {
        MempoolInfo {
            max_size_in_cost: 110_000_000_000,
            minimum_fee_per_cost_to_replace: FeeRate(5),
            max_block_clvm_cost: 11_000_000_000,
        }
    }

    fn item(fee: u64, cost: u64, height: u32) -> MempoolItemInfo {
        MempoolItemInfo {
            cost,
            fee,
            height_added_to_mempool: height,
        }
    }

    #[test]
    fn null_estimator_is_inert() {
        let mut e = FeeEstimator::create(FeeEstimatorConfig::Null, mempool_info());
        e.new_block(&FeeBlockInfo {
            block_height: 1,
            included_items: vec![item(100, 100, 0)],
        });
        assert_eq!(e.estimate_fee_rate(60), FeeRate(0));
        assert_eq!(e.estimate_fee_rate_for_block(1), FeeRate(0));
    }

    #[test]
    fn fixed_estimator_returns_constant() {
        let e = FeeEstimator::create(FeeEstimatorConfig::Fixed(FeeRate(7)), mempool_info());
        assert_eq!(e.estimate_fee_rate(60), FeeRate(7));
        assert_eq!(e.estimate_fee_rate_for_block(100), FeeRate(7));
        assert_eq!(e.estimate_fee_rates(), (FeeRate(7), FeeRate(7), FeeRate(7)));
    }

    #[test]
    fn tracking_estimator_learns_from_blocks() {
        let mut e = FeeEstimator::create(FeeEstimatorConfig::BitcoinCore, mempool_info());

        // no data yet
        assert_eq!(e.estimate_fee_rate_for_block(1), FeeRate(0));

        let cost = 5_000_000;
        // fee per cost 2, confirming within 2 blocks, for a long stretch
        for height in 3_u32..300 {
            e.new_block(&FeeBlockInfo {
                block_height: height,
                included_items: (0..5).map(|_| item(2 * cost, cost, height - 2)).collect(),
            });
        }

        let rate = e.estimate_fee_rate_for_block(5);
        // fee per cost 2 lands in the bucket around 2000 per kilo-cost, so
        // the per-cost estimate rounds to 1..=3
        assert!(rate.0 >= 1 && rate.0 <= 3, "estimate: {:?}", rate);
    }

    #[test]
    fn suggestion_one_bucket_above_failing_range() {
        let mut e = FeeEstimator::create(FeeEstimatorConfig::BitcoinCore, mempool_info());
        let cost = 5_000_000;

        // all observed txs confirm far too slowly for the short horizon
        for height in 60_u32..400 {
            e.new_block(&FeeBlockInfo {
                block_height: height,
                included_items: (0..5).map(|_| item(cost, cost, height - 50)).collect(),
            });
        }

        let tracker = e.tracker().expect("tracking estimator");
        let (short, _, _) = tracker.estimate_fees();
        // the short horizon has no passing bucket, only a failing range
        assert_eq!(short.median, -1.0);
        assert!(short.fail_bucket.start > 0.0);

        // the façade still suggests a rate: one bucket above the failure
        let rate = e.estimate_fee_rate_for_block(5);
        assert!(rate.0 >= 1);
    }
}
