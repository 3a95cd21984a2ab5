pub mod aggsig;
pub mod allocator;
pub mod check_time_locks;
pub mod coin_id;
pub mod conditions;
pub mod consensus_constants;
pub mod flags;
pub mod opcodes;
pub mod owned_conditions;
pub mod pairing_cache;
pub mod sanitize;
pub mod spendbundle_conditions;
pub mod spendbundle_validation;
pub mod validation_error;
