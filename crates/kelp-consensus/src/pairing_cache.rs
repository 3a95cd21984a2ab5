use std::borrow::Borrow;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use chia_bls::{aggregate_verify_gt, hash_to_g2, GTElement, PublicKey, Signature};
use chia_sha2::Sha256;
use linked_hash_map::LinkedHashMap;

/// A cache of pairings of public keys and their corresponding message.
/// It accelerates aggregate verification when some public keys have already
/// been paired, and found in the cache.
/// We use it to cache pairings when validating transactions inserted into the
/// mempool, as many of those transactions are likely to show up in a full
/// block later. This makes it a lot cheaper to validate the full block.
#[derive(Debug)]
struct PairingCacheData {
    // sha256(pubkey + message) -> GTElement
    items: LinkedHashMap<[u8; 32], GTElement>,
    capacity: NonZeroUsize,
}

impl PairingCacheData {
    fn put(&mut self, hash: [u8; 32], pairing: GTElement) {
        // refresh the entry's position if it already exists, evict the
        // least-recently used entry on overflow
        self.items.remove(&hash);
        if self.items.len() == self.capacity.get() {
            self.items.pop_front();
        }
        self.items.insert(hash, pairing);
    }

    fn get(&mut self, hash: &[u8; 32]) -> Option<GTElement> {
        // reads promote
        self.items.get_refresh(hash).cloned()
    }
}

#[derive(Debug)]
pub struct PairingCache {
    cache: Mutex<PairingCacheData>,
}

impl Default for PairingCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(50_000).expect("non-zero"))
    }
}

fn aug_msg_hash(pk: &PublicKey, msg: &[u8]) -> ([u8; 32], Vec<u8>) {
    let mut aug_msg = pk.to_bytes().to_vec();
    aug_msg.extend_from_slice(msg);
    let mut hasher = Sha256::new();
    hasher.update(&aug_msg);
    (hasher.finalize(), aug_msg)
}

impl PairingCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Mutex::new(PairingCacheData {
                items: LinkedHashMap::new(),
                capacity,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().expect("cache").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().expect("cache").items.is_empty()
    }

    /// Verify an aggregate signature over the given (key, message) pairs,
    /// consulting the cache for already-computed pairings and inserting any
    /// newly computed ones.
    pub fn aggregate_verify<Pk: Borrow<PublicKey>, Msg: AsRef<[u8]>>(
        &self,
        pks_msgs: impl IntoIterator<Item = (Pk, Msg)>,
        sig: &Signature,
    ) -> bool {
        let iter = pks_msgs.into_iter().map(|(pk, msg)| -> GTElement {
            let (hash, aug_msg) = aug_msg_hash(pk.borrow(), msg.as_ref());

            if let Some(pairing) = self.cache.lock().expect("cache").get(&hash) {
                return pairing;
            }

            let pairing = hash_to_g2(&aug_msg).pair(pk.borrow());
            self.cache.lock().expect("cache").put(hash, pairing.clone());
            pairing
        });

        aggregate_verify_gt(sig, iter)
    }

    /// Remove the pairings for the given (key, message) pairs. Used when the
    /// coins a cached spend depended on leave the UTXO set for good.
    pub fn evict<Pk: Borrow<PublicKey>, Msg: AsRef<[u8]>>(
        &self,
        pks_msgs: impl IntoIterator<Item = (Pk, Msg)>,
    ) {
        let mut c = self.cache.lock().expect("cache");
        for (pk, msg) in pks_msgs {
            let (hash, _) = aug_msg_hash(pk.borrow(), msg.as_ref());
            c.items.remove(&hash);
        }
    }
}
