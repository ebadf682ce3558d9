use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte Blake3 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub const ZERO: Digest = Digest([0u8; 32]);

    /// Digest of a byte slice
    pub fn of(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Digest(*hash.as_bytes())
    }

    pub fn new(data: [u8; 32]) -> Self {
        Digest(data)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Some(Digest(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Digest of two concatenated digests, used for merkle interior nodes
fn hash_pair(a: &Digest, b: &Digest) -> Digest {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(a.as_bytes());
    data[32..].copy_from_slice(b.as_bytes());
    Digest::of(&data)
}

/// Compute a merkle root over a list of digests.
/// Odd nodes at any level are paired with themselves.
pub fn merkle_root(digests: &[Digest]) -> Digest {
    if digests.is_empty() {
        return Digest::ZERO;
    }

    if digests.len() == 1 {
        return digests[0];
    }

    let mut current_level: Vec<Digest> = digests.to_vec();

    while current_level.len() > 1 {
        let mut next_level = Vec::new();

        for chunk in current_level.chunks(2) {
            let combined = if chunk.len() == 2 {
                hash_pair(&chunk[0], &chunk[1])
            } else {
                hash_pair(&chunk[0], &chunk[0])
            };
            next_level.push(combined);
        }

        current_level = next_level;
    }

    current_level[0]
}
