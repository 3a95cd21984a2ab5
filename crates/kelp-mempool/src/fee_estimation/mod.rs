pub mod constants;
pub mod fee_estimator;
pub mod fee_tracker;
pub mod types;

pub use fee_estimator::{FeeEstimator, FeeEstimatorConfig};
pub use fee_tracker::{BucketResult, EstimateResult, FeeTracker};
pub use types::{FeeBlockInfo, FeeMempoolInfo, FeeRate, MempoolInfo, MempoolItemInfo};
