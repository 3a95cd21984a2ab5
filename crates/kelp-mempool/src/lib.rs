//! The mempool core of a kelp full node: it accepts candidate spend bundles
//! from peers and wallets, validates them against the current coin set and
//! consensus rules, caches them with at-most-one-pending-spend-per-coin
//! discipline, orders them by fee density for block construction, handles
//! replacement-by-fee, and reconciles its state as new blocks arrive on the
//! primary chain or during reorgs.
//!
//! All mutations go through [`mempool_manager::MempoolManager`], which the
//! node serializes behind its blockchain lock. The CPU-heavy part of
//! validation (CLVM execution and aggregate signature checks) is offloaded
//! to a worker pool before admission.

pub mod coin_store;
pub mod fee_estimation;
pub mod mempool;
pub mod mempool_item;
pub mod mempool_manager;
pub mod pending_cache;
pub mod transactions_filter;
pub mod validation_pool;
