// Fee rates are tracked in base units per 1000 cost.

/// Value of the first bucket
pub const MIN_FEE_RATE: f64 = 0.0;
/// First bucket after the zero bucket
pub const INITIAL_STEP: f64 = 100.0;
/// Highest tracked fee rate
pub const MAX_FEE_RATE: f64 = 40_000_000.0;
pub const INFINITE_FEE_RATE: f64 = 1_000_000_000.0;

/// Each bucket's upper edge is 5% above the previous one
pub const STEP_SIZE: f64 = 1.05;

// Track confirm delays up to 10 blocks for the short horizon
pub const SHORT_BLOCK_PERIODS: usize = 10;
pub const SHORT_SCALE: usize = 1;

// Track confirm delays up to 60 blocks for the medium horizon
pub const MED_BLOCK_PERIODS: usize = 30;
pub const MED_SCALE: usize = 2;

// Track confirm delays up to 600 blocks for the long horizon
pub const LONG_BLOCK_PERIODS: usize = 120;
pub const LONG_SCALE: usize = 5;

pub const SHORT_DECAY: f64 = 0.962;
pub const MED_DECAY: f64 = 0.9952;
pub const LONG_DECAY: f64 = 0.99931;

/// Require an 85% success rate for target confirmations
pub const SUCCESS_PCT: f64 = 0.85;
/// Require an average of 0.1 txs in the combined fee rate bucket per block
/// for the bucket range to be statistically significant
pub const SUFFICIENT_FEETXS: f64 = 0.1;

/// The chain's average interval between transaction blocks
pub const SECONDS_PER_BLOCK: f64 = (24.0 * 3600.0) / 4608.0;
