use chia_sha2::Sha256;
use kelp_protocol::Bytes32;

// Golomb-Rice parameters, matching the block transactions filter: a false
// positive rate of 1/M with deltas coded with a Rice parameter of P bits.
const P: u32 = 19;
const M: u64 = 784_931;

/// A compact, probabilistic set of 32-byte ids (a Golomb-coded set). Used to
/// tell peers which transactions we already have without sending the ids
/// themselves. False positives are possible (1 in ~784931), false negatives
/// are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionsFilter {
    n: u32,
    compressed: Vec<u8>,
}

fn hash_to_range(element: &[u8], f: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(element);
    let digest: [u8; 32] = hasher.finalize();
    let h = u64::from_be_bytes(digest[..8].try_into().expect("internal error"));
    // map the hash uniformly onto [0, f)
    ((u128::from(h) * u128::from(f)) >> 64) as u64
}

struct BitWriter {
    bytes: Vec<u8>,
    // bits already used in the last byte
    used: u32,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            used: 8,
        }
    }

    fn write_bit(&mut self, bit: bool) {
        if self.used == 8 {
            self.bytes.push(0);
            self.used = 0;
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> self.used;
        }
        self.used += 1;
    }

    fn write_bits(&mut self, value: u64, count: u32) {
        for i in (0..count).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }
}

struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl BitReader<'_> {
    fn read_bit(&mut self) -> Option<bool> {
        let byte = *self.bytes.get(self.pos / 8)?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1 == 1;
        self.pos += 1;
        Some(bit)
    }

    fn read_bits(&mut self, count: u32) -> Option<u64> {
        let mut v = 0_u64;
        for _ in 0..count {
            v = (v << 1) | u64::from(self.read_bit()?);
        }
        Some(v)
    }
}

impl TransactionsFilter {
    pub fn new(elements: &[Bytes32]) -> Self {
        let n = elements.len() as u32;
        let f = u64::from(n) * M;
        let mut values: Vec<u64> = elements
            .iter()
            .map(|e| hash_to_range(e.as_slice(), f))
            .collect();
        // duplicate hash values encode as zero deltas, keeping the entry
        // count equal to n
        values.sort_unstable();

        let mut writer = BitWriter::new();
        let mut last = 0_u64;
        for v in values {
            let delta = v - last;
            last = v;
            // unary quotient, then P bits of remainder
            let quotient = delta >> P;
            for _ in 0..quotient {
                writer.write_bit(true);
            }
            writer.write_bit(false);
            writer.write_bits(delta & ((1 << P) - 1), P);
        }

        Self {
            n,
            compressed: writer.bytes,
        }
    }

    /// Serialize as a 4-byte big-endian element count followed by the
    /// Golomb-Rice coded deltas.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.n.to_be_bytes().to_vec();
        out.extend_from_slice(&self.compressed);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        let n = u32::from_be_bytes(bytes[..4].try_into().expect("internal error"));
        Some(Self {
            n,
            compressed: bytes[4..].to_vec(),
        })
    }

    /// Check whether any of the given elements is (probably) in the set.
    /// Returns one bool per queried element.
    pub fn match_many(&self, elements: &[Bytes32]) -> Vec<bool> {
        let f = u64::from(self.n) * M;
        let targets: Vec<u64> = elements
            .iter()
            .map(|e| hash_to_range(e.as_slice(), f))
            .collect();

        let mut ret = vec![false; elements.len()];
        if self.n == 0 {
            return ret;
        }

        let mut reader = BitReader {
            bytes: &self.compressed,
            pos: 0,
        };
        let mut last = 0_u64;
        for _ in 0..self.n {
            let mut quotient = 0_u64;
            loop {
                match reader.read_bit() {
                    Some(true) => quotient += 1,
                    Some(false) => break,
                    None => return ret,
                }
            }
            let Some(remainder) = reader.read_bits(P) else {
                return ret;
            };
            last += (quotient << P) | remainder;
            for (i, target) in targets.iter().enumerate() {
                if *target == last {
                    ret[i] = true;
                }
            }
        }
        ret
    }

    pub fn matches(&self, element: &Bytes32) -> bool {
        self.match_many(std::slice::from_ref(element))[0]
    }
}
