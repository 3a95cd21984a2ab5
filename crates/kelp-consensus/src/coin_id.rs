use chia_sha2::Sha256;
use clvmr::allocator::{Allocator, NodePtr};
use kelp_protocol::Bytes32;

pub fn compute_coin_id(
    a: &Allocator,
    parent_id: NodePtr,
    puzzle_hash: NodePtr,
    amount: &[u8],
) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(a.atom(parent_id));
    hasher.update(a.atom(puzzle_hash));
    hasher.update(amount);
    let coin_id: [u8; 32] = hasher.finalize();
    coin_id.into()
}
