use crate::consensus_constants::ConsensusConstants;
use crate::opcodes::{
    ConditionOpcode, AGG_SIG_AMOUNT, AGG_SIG_ME, AGG_SIG_PARENT, AGG_SIG_PARENT_AMOUNT,
    AGG_SIG_PARENT_PUZZLE, AGG_SIG_PUZZLE, AGG_SIG_PUZZLE_AMOUNT, AGG_SIG_UNSAFE,
};
use crate::owned_conditions::{OwnedSpendBundleConditions, OwnedSpendConditions};
use chia_bls::PublicKey;
use kelp_protocol::Coin;

/// Appends the per-opcode suffix to an AGG_SIG message: the spend fields the
/// opcode commits to, followed by the chain's additional data for that
/// opcode.
pub fn make_aggsig_final_message(
    opcode: ConditionOpcode,
    msg: &mut Vec<u8>,
    spend: &OwnedSpendConditions,
    constants: &ConsensusConstants,
) {
    match opcode {
        AGG_SIG_PARENT => {
            msg.extend(spend.parent_id.as_slice());
            msg.extend(constants.agg_sig_parent_additional_data.as_slice());
        }
        AGG_SIG_PUZZLE => {
            msg.extend(spend.puzzle_hash.as_slice());
            msg.extend(constants.agg_sig_puzzle_additional_data.as_slice());
        }
        AGG_SIG_AMOUNT => {
            msg.extend(u64_to_bytes(spend.coin_amount).as_slice());
            msg.extend(constants.agg_sig_amount_additional_data.as_slice());
        }
        AGG_SIG_PUZZLE_AMOUNT => {
            msg.extend(spend.puzzle_hash.as_slice());
            msg.extend(u64_to_bytes(spend.coin_amount).as_slice());
            msg.extend(constants.agg_sig_puzzle_amount_additional_data.as_slice());
        }
        AGG_SIG_PARENT_AMOUNT => {
            msg.extend(spend.parent_id.as_slice());
            msg.extend(u64_to_bytes(spend.coin_amount).as_slice());
            msg.extend(constants.agg_sig_parent_amount_additional_data.as_slice());
        }
        AGG_SIG_PARENT_PUZZLE => {
            msg.extend(spend.parent_id.as_slice());
            msg.extend(spend.puzzle_hash.as_slice());
            msg.extend(constants.agg_sig_parent_puzzle_additional_data.as_slice());
        }
        AGG_SIG_ME => {
            let coin = Coin::new(spend.parent_id, spend.puzzle_hash, spend.coin_amount);
            msg.extend(coin.coin_id().as_slice());
            msg.extend(constants.agg_sig_me_additional_data.as_slice());
        }
        _ => {}
    }
}

/// The canonical (minimal big-endian, sign-preserving) encoding of an
/// unsigned 64-bit value, matching how CLVM atoms encode integers.
pub fn u64_to_bytes(val: u64) -> Vec<u8> {
    let amount_bytes: [u8; 8] = val.to_be_bytes();
    if val >= 0x8000_0000_0000_0000_u64 {
        let mut ret = Vec::<u8>::new();
        ret.push(0_u8);
        ret.extend(amount_bytes);
        ret
    } else {
        let start = match val {
            n if n >= 0x0080_0000_0000_0000_u64 => 0,
            n if n >= 0x8000_0000_0000_u64 => 1,
            n if n >= 0x0080_0000_0000_u64 => 2,
            n if n >= 0x8000_0000_u64 => 3,
            n if n >= 0x0080_0000_u64 => 4,
            n if n >= 0x8000_u64 => 5,
            n if n >= 0x80_u64 => 6,
            n if n > 0 => 7,
            _ => 8,
        };
        amount_bytes[start..].to_vec()
    }
}

/// Expand all aggregate-signature demands of a bundle into the final
/// (public key, message) pairs the aggregate signature must cover.
pub fn pkm_pairs(
    conds: &OwnedSpendBundleConditions,
    constants: &ConsensusConstants,
) -> Vec<(PublicKey, Vec<u8>)> {
    let mut pairs = Vec::new();

    for (pk, msg) in &conds.agg_sig_unsafe {
        pairs.push((*pk, msg.to_vec()));
    }

    for spend in &conds.spends {
        let flavors = [
            (AGG_SIG_PARENT, &spend.agg_sig_parent),
            (AGG_SIG_PUZZLE, &spend.agg_sig_puzzle),
            (AGG_SIG_AMOUNT, &spend.agg_sig_amount),
            (AGG_SIG_PUZZLE_AMOUNT, &spend.agg_sig_puzzle_amount),
            (AGG_SIG_PARENT_AMOUNT, &spend.agg_sig_parent_amount),
            (AGG_SIG_PARENT_PUZZLE, &spend.agg_sig_parent_puzzle),
            (AGG_SIG_ME, &spend.agg_sig_me),
        ];
        for (opcode, sigs) in flavors {
            for (pk, msg) in sigs.iter() {
                let mut final_msg = msg.to_vec();
                make_aggsig_final_message(opcode, &mut final_msg, spend, constants);
                pairs.push((*pk, final_msg));
            }
        }
    }

    pairs
}
