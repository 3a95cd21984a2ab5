use std::sync::Arc;

use crate::fee_estimation::constants::{
    INFINITE_FEE_RATE, INITIAL_STEP, LONG_BLOCK_PERIODS, LONG_DECAY, LONG_SCALE, MAX_FEE_RATE,
    MED_BLOCK_PERIODS, MED_DECAY, MED_SCALE, SECONDS_PER_BLOCK, SHORT_BLOCK_PERIODS, SHORT_DECAY,
    SHORT_SCALE, STEP_SIZE, SUCCESS_PCT, SUFFICIENT_FEETXS,
};
use crate::fee_estimation::types::MempoolItemInfo;

/// A fee rate range and the observation counters that led to a pass or fail
/// decision for it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BucketResult {
    pub start: f64,
    pub end: f64,
    /// decayed count of txs confirmed within the target
    pub within_target: f64,
    /// decayed count of all confirmed txs in the range
    pub total_confirmed: f64,
    /// txs still waiting in the mempool
    pub in_mempool: f64,
    /// txs that left the mempool without confirming
    pub left_mempool: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateResult {
    /// the time window the estimate is for, in seconds
    pub requested_time: u64,
    pub pass_bucket: BucketResult,
    pub fail_bucket: BucketResult,
    /// the median fee rate (per 1000 cost) of the passing range, or -1 when
    /// there is not enough data
    pub median: f64,
}

fn get_bucket_index(buckets: &[f64], fee_rate: f64) -> usize {
    // the highest bucket whose edge does not exceed the rate
    buckets.partition_point(|b| *b <= fee_rate).saturating_sub(1)
}

/// Moving-average statistics over one time horizon: for each fee rate
/// bucket, how many transactions were observed, how quickly they confirmed,
/// and how many failed or are still waiting. Confirmation delays are tracked
/// with a resolution of `scale` blocks, up to `max_confirms` blocks.
struct FeeStat {
    buckets: Arc<Vec<f64>>,

    // For each bucket, the decayed count of observed (confirmed) txs and the
    // decayed sum of their fee rates, so the bucket median is recoverable
    tx_ct_avg: Vec<f64>,
    m_fee_rate_avg: Vec<f64>,

    // confirmed_average[y][x]: decayed count of txs in bucket x confirmed
    // within (y + 1) * scale blocks. failed_average counts txs that left the
    // mempool unconfirmed after sitting (y + 1) * scale blocks
    confirmed_average: Vec<Vec<f64>>,
    failed_average: Vec<Vec<f64>>,

    decay: f64,
    scale: usize,

    // Mempool counts of outstanding transactions, a ring indexed by the
    // block height the tx entered the mempool. Slots older than max_confirms
    // are flushed into old_unconf_txs
    unconfirmed_txs: Vec<Vec<u32>>,
    old_unconf_txs: Vec<u32>,
    max_confirms: usize,
}

impl FeeStat {
    fn new(buckets: Arc<Vec<f64>>, max_periods: usize, decay: f64, scale: usize) -> Self {
        let num_buckets = buckets.len();
        let max_confirms = scale * max_periods;
        Self {
            buckets,
            tx_ct_avg: vec![0.0; num_buckets],
            m_fee_rate_avg: vec![0.0; num_buckets],
            confirmed_average: vec![vec![0.0; num_buckets]; max_periods],
            failed_average: vec![vec![0.0; num_buckets]; max_periods],
            decay,
            scale,
            unconfirmed_txs: vec![vec![0; num_buckets]; max_confirms],
            old_unconf_txs: vec![0; num_buckets],
            max_confirms,
        }
    }

    fn tx_confirmed(&mut self, blocks_to_confirm: usize, item: &MempoolItemInfo) {
        if blocks_to_confirm < 1 {
            return;
        }

        let periods_to_confirm = (blocks_to_confirm + self.scale - 1) / self.scale;

        let fee_rate = item.fee_per_k_cost();
        let bucket_index = get_bucket_index(&self.buckets, fee_rate);

        for i in periods_to_confirm..self.confirmed_average.len() {
            self.confirmed_average[i - 1][bucket_index] += 1.0;
        }

        self.tx_ct_avg[bucket_index] += 1.0;
        self.m_fee_rate_avg[bucket_index] += fee_rate;
    }

    fn update_moving_averages(&mut self) {
        for j in 0..self.buckets.len() {
            for i in 0..self.confirmed_average.len() {
                self.confirmed_average[i][j] *= self.decay;
                self.failed_average[i][j] *= self.decay;
            }
            self.tx_ct_avg[j] *= self.decay;
            self.m_fee_rate_avg[j] *= self.decay;
        }
    }

    /// Flush the ring slot that is about to be reused for `block_height`
    /// into the overflow counters.
    fn clear_current(&mut self, block_height: u32) {
        let slot = block_height as usize % self.unconfirmed_txs.len();
        for i in 0..self.buckets.len() {
            self.old_unconf_txs[i] += self.unconfirmed_txs[slot][i];
            self.unconfirmed_txs[slot][i] = 0;
        }
    }

    fn new_mempool_tx(&mut self, block_height: u32, fee_rate: f64) -> usize {
        let bucket_index = get_bucket_index(&self.buckets, fee_rate);
        let block_index = block_height as usize % self.unconfirmed_txs.len();
        self.unconfirmed_txs[block_index][bucket_index] += 1;
        bucket_index
    }

    /// Account for a tx leaving the mempool. `count_failure` is set when the
    /// tx left without being included in a block.
    fn remove_tx(
        &mut self,
        latest_seen_height: u32,
        item: &MempoolItemInfo,
        bucket_index: usize,
        count_failure: bool,
    ) {
        let mut block_ago = i64::from(latest_seen_height) - i64::from(item.height_added_to_mempool);
        if latest_seen_height == 0 {
            block_ago = 0;
        }
        if block_ago < 0 {
            return;
        }
        let block_ago = block_ago as usize;

        if block_ago >= self.unconfirmed_txs.len() {
            if self.old_unconf_txs[bucket_index] > 0 {
                self.old_unconf_txs[bucket_index] -= 1;
            } else {
                log::warn!("fee estimator: stale unconfirmed count out of sync");
            }
        } else {
            let block_index =
                item.height_added_to_mempool as usize % self.unconfirmed_txs.len();
            if self.unconfirmed_txs[block_index][bucket_index] > 0 {
                self.unconfirmed_txs[block_index][bucket_index] -= 1;
            } else {
                log::warn!("fee estimator: unconfirmed count out of sync");
            }
        }

        if count_failure && block_ago >= self.scale {
            let periods_ago = block_ago / self.scale;
            for i in 0..self.failed_average.len() {
                if i >= periods_ago {
                    break;
                }
                self.failed_average[i][bucket_index] += 1.0;
            }
        }
    }

    /// Scan the buckets from the most expensive down, returning the median
    /// fee rate of the cheapest contiguous range that still confirms at
    /// least `success_break_point` of its transactions within `conf_target`
    /// blocks, along with the pass/fail bucket ranges that support the
    /// decision.
    fn estimate_median_val(
        &self,
        conf_target: usize,
        sufficient_tx_val: f64,
        success_break_point: f64,
        block_height: u32,
    ) -> (BucketResult, BucketResult, f64) {
        let mut n_conf = 0.0; // Number of txs confirmed within conf_target
        let mut total_num = 0.0; // Total number of observed txs
        let mut extra_num = 0.0; // Unconfirmed txs still in the mempool
        let mut fail_num = 0.0; // Txs that left the mempool unconfirmed
        let period_target = (conf_target + self.scale - 1) / self.scale;
        let max_bucket_index = self.buckets.len() - 1;

        let mut cur_near_bucket = max_bucket_index;
        let mut best_near_bucket = max_bucket_index;
        let mut cur_far_bucket = max_bucket_index;
        let mut best_far_bucket = max_bucket_index;

        let mut found_answer = false;
        let bins = self.unconfirmed_txs.len();
        let mut new_bucket_range = true;
        let mut passing = true;
        let mut pass_bucket = BucketResult::default();
        let mut fail_bucket = BucketResult::default();

        for bucket in (0..=max_bucket_index).rev() {
            if new_bucket_range {
                cur_near_bucket = bucket;
                new_bucket_range = false;
            }

            cur_far_bucket = bucket;
            n_conf += self.confirmed_average[period_target - 1][bucket];
            total_num += self.tx_ct_avg[bucket];
            fail_num += self.failed_average[period_target - 1][bucket];
            for conf_ct in conf_target..self.max_confirms {
                let slot = (i64::from(block_height) - conf_ct as i64).rem_euclid(bins as i64);
                extra_num += f64::from(self.unconfirmed_txs[slot as usize][bucket]);
            }
            extra_num += f64::from(self.old_unconf_txs[bucket]);

            if total_num >= sufficient_tx_val / (1.0 - self.decay) {
                let curr_pct = n_conf / (total_num + fail_num + extra_num);

                // Check to see if we are no longer getting confirmed at the
                // same rate
                if curr_pct < success_break_point {
                    if passing {
                        let fail_min_bucket = cur_near_bucket.min(cur_far_bucket);
                        let fail_max_bucket = cur_near_bucket.max(cur_far_bucket);
                        fail_bucket = BucketResult {
                            start: if fail_min_bucket > 0 {
                                self.buckets[fail_min_bucket - 1]
                            } else {
                                0.0
                            },
                            end: self.buckets[fail_max_bucket],
                            within_target: n_conf,
                            total_confirmed: total_num,
                            in_mempool: extra_num,
                            left_mempool: fail_num,
                        };
                        passing = false;
                    }
                    continue;
                } else {
                    fail_bucket = BucketResult::default();
                    found_answer = true;
                    passing = true;
                    pass_bucket.within_target = n_conf;
                    pass_bucket.total_confirmed = total_num;
                    pass_bucket.in_mempool = extra_num;
                    pass_bucket.left_mempool = fail_num;
                    n_conf = 0.0;
                    total_num = 0.0;
                    fail_num = 0.0;
                    extra_num = 0.0;
                    best_near_bucket = cur_near_bucket;
                    best_far_bucket = cur_far_bucket;
                    new_bucket_range = true;
                }
            }
        }

        let mut median = -1.0;
        let mut tx_sum = 0.0;

        let min_bucket = best_near_bucket.min(best_far_bucket);
        let max_bucket = best_near_bucket.max(best_far_bucket);

        for i in min_bucket..=max_bucket {
            tx_sum += self.tx_ct_avg[i];
        }

        if found_answer && tx_sum != 0.0 {
            tx_sum /= 2.0;
            for i in min_bucket..=max_bucket {
                if self.tx_ct_avg[i] < tx_sum {
                    tx_sum -= self.tx_ct_avg[i];
                } else {
                    median = self.m_fee_rate_avg[i] / self.tx_ct_avg[i];
                    break;
                }
            }
            pass_bucket.start = if min_bucket > 0 {
                self.buckets[min_bucket - 1]
            } else {
                0.0
            };
            pass_bucket.end = self.buckets[max_bucket];
        }

        if passing && !new_bucket_range {
            let fail_min_bucket = cur_near_bucket.min(cur_far_bucket);
            let fail_max_bucket = cur_near_bucket.max(cur_far_bucket);
            fail_bucket = BucketResult {
                start: if fail_min_bucket > 0 {
                    self.buckets[fail_min_bucket - 1]
                } else {
                    0.0
                },
                end: self.buckets[fail_max_bucket],
                within_target: n_conf,
                total_confirmed: total_num,
                in_mempool: extra_num,
                left_mempool: fail_num,
            };
        }

        (pass_bucket, fail_bucket, median)
    }
}

/// Bucketed moving-average observer of confirmation latency per fee rate
/// bucket, over three time horizons with their own decay and resolution.
pub struct FeeTracker {
    buckets: Arc<Vec<f64>>,
    latest_seen_height: u32,
    first_recorded_height: u32,
    short_horizon: FeeStat,
    med_horizon: FeeStat,
    long_horizon: FeeStat,
}

impl Default for FeeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FeeTracker {
    pub fn new() -> Self {
        let mut buckets = Vec::new();
        let mut fee_rate = 0.0;
        while fee_rate < MAX_FEE_RATE {
            buckets.push(fee_rate);
            if fee_rate == 0.0 {
                fee_rate = INITIAL_STEP;
            } else {
                fee_rate *= STEP_SIZE;
            }
        }
        buckets.push(INFINITE_FEE_RATE);
        let buckets = Arc::new(buckets);

        Self {
            short_horizon: FeeStat::new(
                buckets.clone(),
                SHORT_BLOCK_PERIODS,
                SHORT_DECAY,
                SHORT_SCALE,
            ),
            med_horizon: FeeStat::new(buckets.clone(), MED_BLOCK_PERIODS, MED_DECAY, MED_SCALE),
            long_horizon: FeeStat::new(
                buckets.clone(),
                LONG_BLOCK_PERIODS,
                LONG_DECAY,
                LONG_SCALE,
            ),
            buckets,
            latest_seen_height: 0,
            first_recorded_height: 0,
        }
    }

    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    pub fn latest_seen_height(&self) -> u32 {
        self.latest_seen_height
    }

    pub fn first_recorded_height(&self) -> u32 {
        self.first_recorded_height
    }

    pub fn get_bucket_index(&self, fee_rate: f64) -> usize {
        get_bucket_index(&self.buckets, fee_rate)
    }

    /// A new block has been farmed and these transactions have been included
    pub fn process_block(&mut self, block_height: u32, items: &[MempoolItemInfo]) {
        if block_height <= self.latest_seen_height {
            // Ignore reorgs
            return;
        }

        self.latest_seen_height = block_height;

        // the ring slot for this height is reused, flush what's left in it
        self.short_horizon.clear_current(block_height);
        self.med_horizon.clear_current(block_height);
        self.long_horizon.clear_current(block_height);

        self.short_horizon.update_moving_averages();
        self.med_horizon.update_moving_averages();
        self.long_horizon.update_moving_averages();

        let mut counted_txs = 0;
        for item in items {
            counted_txs += 1;
            self.process_block_tx(block_height, item);
        }

        if self.first_recorded_height == 0 && counted_txs > 0 {
            log::info!("fee estimator: first recorded height {block_height}");
            self.first_recorded_height = block_height;
        }
    }

    fn process_block_tx(&mut self, height: u32, item: &MempoolItemInfo) {
        let blocks_to_confirm = i64::from(height) - i64::from(item.height_added_to_mempool);
        if blocks_to_confirm <= 0 {
            return;
        }
        let blocks_to_confirm = blocks_to_confirm as usize;

        let bucket_index = self.get_bucket_index(item.fee_per_k_cost());

        self.short_horizon.tx_confirmed(blocks_to_confirm, item);
        self.med_horizon.tx_confirmed(blocks_to_confirm, item);
        self.long_horizon.tx_confirmed(blocks_to_confirm, item);

        // the tx is no longer outstanding
        self.short_horizon
            .remove_tx(self.latest_seen_height, item, bucket_index, false);
        self.med_horizon
            .remove_tx(self.latest_seen_height, item, bucket_index, false);
        self.long_horizon
            .remove_tx(self.latest_seen_height, item, bucket_index, false);
    }

    /// A new tx entered the mempool
    pub fn add_tx(&mut self, item: &MempoolItemInfo) {
        let fee_rate = item.fee_per_k_cost();
        self.short_horizon
            .new_mempool_tx(self.latest_seen_height, fee_rate);
        self.med_horizon
            .new_mempool_tx(self.latest_seen_height, fee_rate);
        self.long_horizon
            .new_mempool_tx(self.latest_seen_height, fee_rate);
    }

    /// A tx left the mempool without being included in a block
    pub fn remove_tx(&mut self, item: &MempoolItemInfo) {
        let bucket_index = self.get_bucket_index(item.fee_per_k_cost());
        self.short_horizon
            .remove_tx(self.latest_seen_height, item, bucket_index, true);
        self.med_horizon
            .remove_tx(self.latest_seen_height, item, bucket_index, true);
        self.long_horizon
            .remove_tx(self.latest_seen_height, item, bucket_index, true);
    }

    /// The fee estimates for the short, medium and long time horizons
    pub fn estimate_fees(&self) -> (EstimateResult, EstimateResult, EstimateResult) {
        let short = self.estimate_for_horizon(
            &self.short_horizon,
            SHORT_BLOCK_PERIODS * SHORT_SCALE - SHORT_SCALE,
        );
        let med = self.estimate_for_horizon(
            &self.med_horizon,
            MED_BLOCK_PERIODS * MED_SCALE - MED_SCALE,
        );
        let long = self.estimate_for_horizon(
            &self.long_horizon,
            LONG_BLOCK_PERIODS * LONG_SCALE - LONG_SCALE,
        );
        (short, med, long)
    }

    /// The fee estimate for inclusion within `target_block` blocks. The
    /// target is mapped onto the tightest horizon that covers it.
    pub fn estimate_fee_for_block(&self, target_block: u32) -> EstimateResult {
        let target = target_block as usize;
        let short_max = SHORT_BLOCK_PERIODS * SHORT_SCALE - SHORT_SCALE;
        let med_max = MED_BLOCK_PERIODS * MED_SCALE - MED_SCALE;
        let long_max = LONG_BLOCK_PERIODS * LONG_SCALE - LONG_SCALE;

        if target <= short_max {
            self.estimate_for_horizon(&self.short_horizon, target.max(SHORT_SCALE))
        } else if target <= med_max {
            self.estimate_for_horizon(&self.med_horizon, target.max(MED_SCALE))
        } else {
            self.estimate_for_horizon(&self.long_horizon, target.min(long_max).max(LONG_SCALE))
        }
    }

    /// The fee estimate for inclusion within the given time window
    pub fn estimate_fee(&self, time_offset_seconds: u64) -> EstimateResult {
        let blocks = (time_offset_seconds as f64 / SECONDS_PER_BLOCK).max(1.0) as u32;
        self.estimate_fee_for_block(blocks)
    }

    fn estimate_for_horizon(&self, horizon: &FeeStat, conf_target: usize) -> EstimateResult {
        let (pass_bucket, fail_bucket, median) = horizon.estimate_median_val(
            conf_target,
            SUFFICIENT_FEETXS,
            SUCCESS_PCT,
            self.latest_seen_height,
        );
        EstimateResult {
            requested_time: (conf_target as f64 * SECONDS_PER_BLOCK) as u64,
            pass_bucket,
            fail_bucket,
            median,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(fee: u64, cost: u64, height_added: u32) -> MempoolItemInfo {
        MempoolItemInfo {
            cost,
            fee,
            height_added_to_mempool: height_added,
        }
    }

    #[test]
    fn bucket_index_lookup() {
        let tracker = FeeTracker::new();
        let buckets = tracker.buckets();
        // the zero bucket
        assert_eq!(tracker.get_bucket_index(0.0), 0);
        // exactly on an edge maps to that bucket
        assert_eq!(tracker.get_bucket_index(buckets[5]), 5);
        // between two edges maps to the lower one
        let mid = (buckets[5] + buckets[6]) / 2.0;
        assert_eq!(tracker.get_bucket_index(mid), 5);
        // beyond the last edge maps to the last bucket
        assert_eq!(tracker.get_bucket_index(2e9), buckets.len() - 1);
    }

    #[test]
    fn estimates_with_steady_confirmations() {
        let mut tracker = FeeTracker::new();
        let cost = 5_000_000;

        // blocks of transactions confirming with 1, 40 and 270 block delays
        for height in 300_u32..700 {
            let mut items = Vec::new();
            for _ in 2..100 {
                items.push(info(10_000_000, cost, height - 1));
                items.push(info(200_000, cost, height - 40));
                items.push(info(0, cost, height - 270));
            }
            tracker.process_block(height, &items);
        }

        let (short, med, long) = tracker.estimate_fees();
        assert!(short.median != -1.0);
        assert!(med.median != -1.0);
        assert!(long.median != -1.0);

        // faster confirmation windows demand higher fee rates
        assert!(short.median >= med.median);
        assert!(med.median >= long.median);
    }

    #[test]
    fn no_data_no_estimate() {
        let tracker = FeeTracker::new();
        let (short, med, long) = tracker.estimate_fees();
        assert_eq!(short.median, -1.0);
        assert_eq!(med.median, -1.0);
        assert_eq!(long.median, -1.0);
    }

    #[test]
    fn convergence_to_single_fee_rate() {
        // every block includes one transaction of fee-per-cost 2 admitted 5
        // blocks earlier
        let mut tracker = FeeTracker::new();
        let cost = 5_000_000;
        let fee = 2 * cost; // fee per cost = 2, per kilo-cost = 2000

        for height in 1_u32..=200 {
            let items = if height > 5 {
                vec![info(fee, cost, height - 5)]
            } else {
                vec![]
            };
            tracker.process_block(height, &items);
        }

        let result = tracker.estimate_fee_for_block(5);
        assert!(result.median != -1.0);

        // the estimate lands in the bucket containing the observed rate
        let observed_bucket = tracker.get_bucket_index(2000.0);
        let estimate_bucket = tracker.get_bucket_index(result.median);
        assert!(estimate_bucket.abs_diff(observed_bucket) <= 1);
    }

    #[test]
    fn failed_txs_push_estimate_up() {
        let mut tracker = FeeTracker::new();
        let cost = 5_000_000;

        // low-fee txs keep failing, high-fee txs confirm promptly
        for height in 1_u32..=300 {
            let confirmed = if height > 2 {
                vec![info(20_000_000, cost, height - 2)]
            } else {
                vec![]
            };
            tracker.process_block(height, &confirmed);
            if height > 20 {
                // a low fee tx that sat for 15 blocks and got evicted
                tracker.add_tx(&info(1_000, cost, height));
                tracker.remove_tx(&info(1_000, cost, height - 15));
            }
        }

        let result = tracker.estimate_fee_for_block(5);
        assert!(result.median != -1.0);
        // the failing low-fee bucket is excluded from the passing range
        let low_bucket = tracker.get_bucket_index(200.0);
        assert!(tracker.get_bucket_index(result.median) > low_bucket);
    }

    #[test]
    fn reorgs_are_ignored() {
        let mut tracker = FeeTracker::new();
        tracker.process_block(100, &[info(1000, 1000, 95)]);
        assert_eq!(tracker.latest_seen_height(), 100);
        // a lower height does not roll anything back
        tracker.process_block(90, &[info(1000, 1000, 85)]);
        assert_eq!(tracker.latest_seen_height(), 100);
    }

    #[test]
    fn time_maps_to_block_target() {
        let tracker = FeeTracker::new();
        // ~19 seconds is one block
        let a = tracker.estimate_fee(19);
        let b = tracker.estimate_fee_for_block(1);
        assert_eq!(a.requested_time, b.requested_time);
    }
}
