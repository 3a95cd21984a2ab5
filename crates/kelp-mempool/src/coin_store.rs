use kelp_protocol::{Bytes32, CoinRecord};

/// The most recent unspent coin of a singleton lineage, by puzzle hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnspentLineageInfo {
    pub coin_id: Bytes32,
    pub parent_id: Bytes32,
    pub parent_parent_id: Bytes32,
}

/// Read-only lookup interface into the node's coin set. The mempool never
/// writes through this interface.
#[allow(async_fn_in_trait)]
pub trait CoinStore {
    /// Look up a coin record by its id. Returns None for coins the store has
    /// never seen.
    async fn get_coin_record(&self, coin_id: &Bytes32) -> Option<CoinRecord>;

    /// Look up the latest unspent coin of a singleton lineage with the given
    /// puzzle hash, if there is exactly one. Used by singleton fast-forward.
    async fn get_unspent_lineage_info_for_puzzle_hash(
        &self,
        puzzle_hash: &Bytes32,
    ) -> Option<UnspentLineageInfo>;
}
