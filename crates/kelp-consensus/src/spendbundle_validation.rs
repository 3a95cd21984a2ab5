use crate::aggsig::pkm_pairs;
use crate::consensus_constants::ConsensusConstants;
use crate::flags::ALLOW_BACKREFS;
use crate::owned_conditions::OwnedSpendBundleConditions;
use crate::pairing_cache::PairingCache;
use crate::spendbundle_conditions::get_conditions_from_spendbundle;
use crate::validation_error::ErrorCode;
use kelp_protocol::SpendBundle;

pub fn get_flags_for_height_and_constants(height: u32, constants: &ConsensusConstants) -> u32 {
    let mut flags: u32 = 0;

    if height >= constants.hard_fork_height {
        // from the hard fork on, generators are allowed to be serialized with
        // back-references
        flags |= ALLOW_BACKREFS;
    }
    flags
}

/// The heavy part of transaction validation, meant to be run on a worker
/// thread: run the CLVM of every spend, parse and validate the conditions,
/// and verify the bundle's aggregate signature over all extracted
/// (key, message) pairs, consulting (and populating) the shared pairing
/// cache.
pub fn validate_clvm_and_signature(
    spend_bundle: &SpendBundle,
    max_cost: u64,
    constants: &ConsensusConstants,
    height: u32,
    cache: &PairingCache,
) -> Result<OwnedSpendBundleConditions, ErrorCode> {
    let mut conditions =
        get_conditions_from_spendbundle(spend_bundle, max_cost, height, constants)
            .map_err(|e| e.1)?;

    let pairs = pkm_pairs(&conditions, constants);
    if !cache.aggregate_verify(
        pairs.iter().map(|(pk, msg)| (pk, msg.as_slice())),
        &spend_bundle.aggregated_signature,
    ) {
        return Err(ErrorCode::BadAggregateSignature);
    }
    conditions.validated_signature = true;

    Ok(conditions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus_constants::TEST_CONSTANTS;
    use chia_bls::{sign, SecretKey, Signature};
    use clvmr::serde::node_to_bytes;
    use clvmr::Allocator;
    use kelp_protocol::{Coin, CoinSpend, Program};

    // build a solution for the identity puzzle carrying the given serialized
    // condition list
    fn identity_spend(coin: Coin, conditions: &[Vec<Vec<u8>>]) -> CoinSpend {
        let mut a = Allocator::new();
        let mut list = a.nil();
        for cond in conditions.iter().rev() {
            let mut c = a.nil();
            for arg in cond.iter().rev() {
                let arg = a.new_atom(arg).expect("new_atom");
                c = a.new_pair(arg, c).expect("new_pair");
            }
            list = a.new_pair(c, list).expect("new_pair");
        }
        let solution = node_to_bytes(&a, list).expect("node_to_bytes");
        CoinSpend::new(coin, Program::new(vec![1_u8].into()), solution.into())
    }

    fn identity_coin(parent: [u8; 32], amount: u64) -> Coin {
        // tree hash of the identity puzzle (a single atom `1`)
        let identity_hash: [u8; 32] = {
            let mut hasher = chia_sha2::Sha256::new();
            hasher.update([1_u8]);
            hasher.update([1_u8]);
            hasher.finalize()
        };
        Coin::new(parent.into(), identity_hash.into(), amount)
    }

    #[test]
    fn valid_agg_sig_me_signature() {
        let sk = SecretKey::from_seed(&[7; 32]);
        let pk = sk.public_key();
        let coin = identity_coin([1; 32], 1000);

        let msg = b"spend approval".to_vec();
        let spend = identity_spend(
            coin,
            &[vec![vec![50], pk.to_bytes().to_vec(), msg.clone()]],
        );

        // AGG_SIG_ME commits to the coin id and the chain's additional data
        let mut final_msg = msg;
        final_msg.extend(coin.coin_id().as_slice());
        final_msg.extend(TEST_CONSTANTS.agg_sig_me_additional_data.as_slice());
        let sig = sign(&sk, &final_msg);

        let bundle = SpendBundle::new(vec![spend], sig);
        let cache = PairingCache::default();
        let conds = validate_clvm_and_signature(
            &bundle,
            TEST_CONSTANTS.max_block_cost_clvm,
            &TEST_CONSTANTS,
            0,
            &cache,
        )
        .expect("validate");

        assert!(conds.validated_signature);
        assert_eq!(conds.spends.len(), 1);
        assert_eq!(conds.spends[0].agg_sig_me.len(), 1);
        // the pairing was cached for later block validation
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bad_signature_rejected() {
        let sk = SecretKey::from_seed(&[7; 32]);
        let pk = sk.public_key();
        let coin = identity_coin([1; 32], 1000);

        let spend = identity_spend(
            coin,
            &[vec![vec![50], pk.to_bytes().to_vec(), b"message".to_vec()]],
        );

        // signature over the wrong message
        let sig = sign(&sk, b"some other message");
        let bundle = SpendBundle::new(vec![spend], sig);
        let cache = PairingCache::default();
        let err = validate_clvm_and_signature(
            &bundle,
            TEST_CONSTANTS.max_block_cost_clvm,
            &TEST_CONSTANTS,
            0,
            &cache,
        )
        .unwrap_err();
        assert_eq!(err, ErrorCode::BadAggregateSignature);
    }

    #[test]
    fn no_signatures_needed() {
        let coin = identity_coin([1; 32], 1000);
        // a single CREATE_COIN, spending 1000 into 900 with 100 in fees
        let spend = identity_spend(
            coin,
            &[vec![vec![51], vec![9; 32], vec![0x03, 0x84]]],
        );
        let bundle = SpendBundle::new(vec![spend], Signature::default());
        let cache = PairingCache::default();
        let conds = validate_clvm_and_signature(
            &bundle,
            TEST_CONSTANTS.max_block_cost_clvm,
            &TEST_CONSTANTS,
            0,
            &cache,
        )
        .expect("validate");
        assert_eq!(conds.spends[0].create_coin.len(), 1);
        assert_eq!(conds.addition_amount, 900);
        assert!(cache.is_empty());
    }
}
