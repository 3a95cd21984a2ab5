use chia_streamable_macro::streamable;

use crate::Bytes32;

/// The mempool's view of a block on the primary chain. This is not hashed
/// into the chain; it carries the fields peak tracking and transaction
/// validation need.
#[streamable]
pub struct BlockRecord {
    header_hash: Bytes32,
    prev_hash: Bytes32,
    height: u32,
    // Total cumulative difficulty of all ancestor blocks since genesis
    weight: u128,
    prev_transaction_block_height: u32,

    // Transaction block (present iff is_transaction_block)
    timestamp: Option<u64>,
    // Header hash of the previous transaction block
    prev_transaction_block_hash: Option<Bytes32>,
    fees: Option<u64>,
}

impl BlockRecord {
    pub fn is_transaction_block(&self) -> bool {
        self.timestamp.is_some()
    }
}
