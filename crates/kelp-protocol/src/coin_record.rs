use chia_streamable_macro::streamable;

use crate::Coin;

/// The coin store's view of a coin: where it was confirmed, whether (and
/// where) it was spent, and the timestamp of its confirmation block.
#[streamable]
#[derive(Copy)]
pub struct CoinRecord {
    coin: Coin,
    confirmed_block_index: u32,
    spent_block_index: u32,
    coinbase: bool,
    timestamp: u64,
}

impl CoinRecord {
    pub fn spent(&self) -> bool {
        self.spent_block_index > 0
    }

    pub fn name(&self) -> crate::Bytes32 {
        self.coin.coin_id()
    }
}
