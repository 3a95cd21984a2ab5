use crate::allocator::make_allocator;
use crate::conditions::{process_single_spend, validate_conditions, ParseState, SpendBundleConditions};
use crate::consensus_constants::ConsensusConstants;
use crate::flags::MEMPOOL_MODE;
use crate::owned_conditions::OwnedSpendBundleConditions;
use crate::spendbundle_validation::get_flags_for_height_and_constants;
use crate::validation_error::{ErrorCode, ValidationErr};
use clvm_utils::tree_hash;
use clvmr::allocator::Allocator;
use clvmr::chia_dialect::ChiaDialect;
use clvmr::chia_dialect::ClvmFlags;
use clvmr::cost::Cost;
use clvmr::reduction::Reduction;
use clvmr::run_program::run_program;
use clvmr::serde::node_from_bytes;
use kelp_protocol::SpendBundle;

pub fn subtract_cost(
    a: &Allocator,
    cost_left: &mut Cost,
    subtract: Cost,
) -> Result<(), ValidationErr> {
    if subtract > *cost_left {
        Err(ValidationErr(a.nil(), ErrorCode::CostExceeded))
    } else {
        *cost_left -= subtract;
        Ok(())
    }
}

/// Run all puzzle reveals of a spend bundle under a shared cost budget and
/// collect the resulting conditions. The returned conditions have
/// `validated_signature` unset; signature verification is a separate step
/// (see spendbundle_validation).
pub fn get_conditions_from_spendbundle(
    spend_bundle: &SpendBundle,
    max_cost: u64,
    height: u32,
    constants: &ConsensusConstants,
) -> Result<OwnedSpendBundleConditions, ValidationErr> {
    let flags = get_flags_for_height_and_constants(height, constants) | MEMPOOL_MODE;

    let mut cost_left = max_cost;
    let dialect = ChiaDialect::new(ClvmFlags::from_bits_retain(flags));
    let mut a: Allocator = make_allocator(ClvmFlags::LIMIT_HEAP.bits());
    let mut ret = SpendBundleConditions::default();
    let mut state = ParseState::default();

    for coin_spend in &spend_bundle.coin_spends {
        // the serialized spend counts against the block budget the same way
        // it would as part of a block
        let byte_cost = (coin_spend.puzzle_reveal.len() + coin_spend.solution.len()) as u64
            * constants.cost_per_byte;
        subtract_cost(&a, &mut cost_left, byte_cost)?;

        // process the spend
        let puz = node_from_bytes(&mut a, coin_spend.puzzle_reveal.as_slice())?;
        let sol = node_from_bytes(&mut a, coin_spend.solution.as_slice())?;
        let parent = a.new_atom(coin_spend.coin.parent_coin_info.as_slice())?;
        let amount = a.new_number(coin_spend.coin.amount.into())?;
        let Reduction(clvm_cost, conditions) = run_program(&mut a, &dialect, puz, sol, cost_left)?;

        subtract_cost(&a, &mut cost_left, clvm_cost)?;

        let buf = tree_hash(&a, puz);
        let puzzle_hash = a.new_atom(&buf)?;
        process_single_spend(
            &a,
            &mut ret,
            &mut state,
            parent,
            puzzle_hash,
            amount,
            conditions,
            flags,
            &mut cost_left,
            constants,
        )?;
    }

    let nil = a.nil();
    validate_conditions(&a, &ret, &state, nil)?;
    debug_assert!(max_cost >= cost_left);
    ret.cost = max_cost - cost_left;
    Ok(OwnedSpendBundleConditions::from(&a, ret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus_constants::TEST_CONSTANTS;
    use chia_bls::Signature;
    use hex_literal::hex;
    use kelp_protocol::{Coin, CoinSpend, Program};

    #[test]
    fn identity_puzzle_with_agg_sig_unsafe() {
        let test_coin = Coin::new(
            hex!("4444444444444444444444444444444444444444444444444444444444444444").into(),
            hex!("3333333333333333333333333333333333333333333333333333333333333333").into(),
            1,
        );

        // ((49 0x997cc43ed8788f841fcf3071f6f212b89ba494b6ebaf1bda88c3f9de9d968a61f3b7284a5ee13889399ca71a026549a2 "hello"))
        let solution = hex!("ffff31ffb0997cc43ed8788f841fcf3071f6f212b89ba494b6ebaf1bda88c3f9de9d968a61f3b7284a5ee13889399ca71a026549a2ff8568656c6c6f8080").to_vec();

        // the identity puzzle returns its solution
        let spend = CoinSpend::new(test_coin, Program::new(vec![1_u8].into()), solution.into());

        let spend_bundle = SpendBundle {
            coin_spends: vec![spend],
            aggregated_signature: Signature::default(),
        };
        let osbc = get_conditions_from_spendbundle(
            &spend_bundle,
            TEST_CONSTANTS.max_block_cost_clvm,
            236,
            &TEST_CONSTANTS,
        )
        .expect("parse spend bundle");

        assert_eq!(osbc.spends.len(), 1);
        assert_eq!(osbc.agg_sig_unsafe.len(), 1);
        // the spend's puzzle hash is the tree hash of the reveal, not the
        // (bogus) hash the coin declares; the mempool checks that mismatch
        // against the coin store
        assert_ne!(osbc.spends[0].puzzle_hash, test_coin.puzzle_hash);
        assert!(osbc.cost > 0);
        assert!(!osbc.validated_signature);
    }

    #[test]
    fn cost_limit_enforced() {
        let test_coin = Coin::new([4_u8; 32].into(), [3_u8; 32].into(), 1);
        let solution = hex!("ffff31ffb0997cc43ed8788f841fcf3071f6f212b89ba494b6ebaf1bda88c3f9de9d968a61f3b7284a5ee13889399ca71a026549a2ff8568656c6c6f8080").to_vec();
        let spend = CoinSpend::new(test_coin, Program::new(vec![1_u8].into()), solution.into());
        let spend_bundle = SpendBundle {
            coin_spends: vec![spend],
            aggregated_signature: Signature::default(),
        };

        let err = get_conditions_from_spendbundle(&spend_bundle, 1000, 236, &TEST_CONSTANTS)
            .unwrap_err();
        assert_eq!(err.1, ErrorCode::CostExceeded);
    }

    #[test]
    fn garbage_puzzle_reveal() {
        let test_coin = Coin::new([4_u8; 32].into(), [3_u8; 32].into(), 1);
        // 0xff introduces a pair that never ends
        let spend = CoinSpend::new(
            test_coin,
            Program::new(vec![0xff_u8].into()),
            Program::default(),
        );
        let spend_bundle = SpendBundle {
            coin_spends: vec![spend],
            aggregated_signature: Signature::default(),
        };

        let err = get_conditions_from_spendbundle(
            &spend_bundle,
            TEST_CONSTANTS.max_block_cost_clvm,
            236,
            &TEST_CONSTANTS,
        )
        .unwrap_err();
        assert_eq!(err.1, ErrorCode::GeneratorRuntimeError);
    }
}
