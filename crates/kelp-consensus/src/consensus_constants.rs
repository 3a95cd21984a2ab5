use chia_streamable_macro::streamable;
use hex_literal::hex;
use kelp_protocol::Bytes32;

/// The consensus constants the transaction layer consumes. Networks
/// (mainnet, testnets, simulators) each provide their own instance.
#[streamable]
pub struct ConsensusConstants {
    /// Used as the initial challenge at genesis. We override this value based
    /// on the chain being run.
    genesis_challenge: Bytes32,

    /// Forks of kelp should change this value to provide replay attack
    /// protection. Mixed into AGG_SIG_ME messages.
    agg_sig_me_additional_data: Bytes32,
    agg_sig_parent_additional_data: Bytes32,
    agg_sig_puzzle_additional_data: Bytes32,
    agg_sig_amount_additional_data: Bytes32,
    agg_sig_puzzle_amount_additional_data: Bytes32,
    agg_sig_parent_amount_additional_data: Bytes32,
    agg_sig_parent_puzzle_additional_data: Bytes32,

    /// Max coin amount. This allows coin amounts to fit in 64 bits.
    max_coin_amount: u64,

    /// Max block cost in clvm cost units.
    max_block_cost_clvm: u64,

    /// Cost per byte of generator program.
    cost_per_byte: u64,

    /// Size of mempool = mempool_block_buffer times the cost of a block.
    mempool_block_buffer: u8,

    /// The height at which the chain's hard fork rules (back-reference
    /// serialization for generators) activate.
    hard_fork_height: u32,
}

pub const TEST_CONSTANTS: ConsensusConstants = ConsensusConstants {
    genesis_challenge: Bytes32::new(hex!(
        "f2419c72f1456cee84ff03180b5b77abd4eb38fe59d4c27ebb67d818e6d74cd7"
    )),
    // AGG_SIG_ME mixes in the genesis challenge itself; the per-opcode
    // variants mix in sha256(genesis_challenge || opcode)
    agg_sig_me_additional_data: Bytes32::new(hex!(
        "f2419c72f1456cee84ff03180b5b77abd4eb38fe59d4c27ebb67d818e6d74cd7"
    )),
    agg_sig_parent_additional_data: Bytes32::new(hex!(
        "20e56358e31dbfcbad831adf5b1535b3dc4fbf79a2cd368e189ebeebf203d729"
    )),
    agg_sig_puzzle_additional_data: Bytes32::new(hex!(
        "f9bd2e3baa964413ae4daeed6c558cf683b5dfcf609404283eb32a29564513a2"
    )),
    agg_sig_amount_additional_data: Bytes32::new(hex!(
        "35834ecce6e303843289ef86e75cb8b851154f2c7cc9a11c572621bf65b4715e"
    )),
    agg_sig_puzzle_amount_additional_data: Bytes32::new(hex!(
        "aa304fbb7de054d8f5b6dc932524de6727a66b8dd87d82a22ba5046ce4ba3804"
    )),
    agg_sig_parent_amount_additional_data: Bytes32::new(hex!(
        "bb749c74f32b12359963c710c57518c56ecb3427577bbb799fdac39bb5ea7157"
    )),
    agg_sig_parent_puzzle_additional_data: Bytes32::new(hex!(
        "c848a026bae78b7bf6ce4e5e5f3e8f12a6a228eaea26a9ea2653c692dea8df3d"
    )),
    max_coin_amount: 0xffff_ffff_ffff_ffff,
    max_block_cost_clvm: 11_000_000_000,
    cost_per_byte: 12_000,
    mempool_block_buffer: 10,
    hard_fork_height: 0,
};
