use crate::coin_spend::CoinSpend;
use crate::Bytes32;
use crate::Coin;
use chia_bls::Signature;
use chia_streamable_macro::streamable;
use chia_traits::Streamable;

#[streamable]
pub struct SpendBundle {
    coin_spends: Vec<CoinSpend>,
    aggregated_signature: Signature,
}

impl SpendBundle {
    pub fn aggregate(spend_bundles: &[SpendBundle]) -> SpendBundle {
        let mut coin_spends = Vec::<CoinSpend>::new();
        let mut aggregated_signature = Signature::default();
        for sb in spend_bundles {
            coin_spends.extend_from_slice(&sb.coin_spends[..]);
            aggregated_signature.aggregate(&sb.aggregated_signature);
        }
        SpendBundle {
            coin_spends,
            aggregated_signature,
        }
    }

    /// The bundle id: the streamable hash of the whole bundle.
    pub fn name(&self) -> Bytes32 {
        self.hash().into()
    }

    pub fn removals(&self) -> Vec<Coin> {
        self.coin_spends.iter().map(|cs| cs.coin).collect()
    }
}
