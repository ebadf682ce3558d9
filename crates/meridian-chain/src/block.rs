use serde::{Deserialize, Serialize};
use std::fmt;

use meridian_core::{merkle_root, serialize, AccountName, BlockTimestamp, Digest, PublicKey};

use crate::error::ChainError;
use crate::transaction::SignedTransaction;

/// A block id: the header digest with the block number embedded in the
/// first 8 bytes (big-endian), so the number is recoverable from the id
/// and ids sort by height.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct BlockId([u8; 32]);

impl BlockId {
    pub const ZERO: BlockId = BlockId([0u8; 32]);

    pub fn from_digest(block_num: u64, digest: Digest) -> Self {
        let mut bytes = *digest.as_bytes();
        bytes[..8].copy_from_slice(&block_num.to_be_bytes());
        BlockId(bytes)
    }

    /// The block number embedded in this id
    pub fn num(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(prefix)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId(num={}, {})", self.num(), self.to_hex())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// One producer's slot in a schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerKey {
    pub producer_name: AccountName,
    pub signing_key: PublicKey,
}

/// The ordered set of block producers active for a span of blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProducerSchedule {
    pub version: u32,
    pub producers: Vec<ProducerKey>,
}

impl ProducerSchedule {
    /// The signing key registered for a producer, if scheduled
    pub fn signing_key(&self, producer: AccountName) -> Option<PublicKey> {
        self.producers
            .iter()
            .find(|p| p.producer_name == producer)
            .map(|p| p.signing_key)
    }

    pub fn digest(&self) -> Result<Digest, ChainError> {
        Ok(Digest::of(&serialize::pack(self)?))
    }
}

/// A block header; the id chains through `previous`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub timestamp: BlockTimestamp,
    pub producer: AccountName,
    pub previous: BlockId,
    pub transaction_mroot: Digest,
    pub schedule_version: u32,
}

impl BlockHeader {
    pub fn digest(&self) -> Result<Digest, ChainError> {
        Ok(Digest::of(&serialize::pack(self)?))
    }

    /// Block number: one past the previous block's embedded number
    pub fn block_num(&self) -> u64 {
        self.previous.num() + 1
    }

    pub fn id(&self) -> Result<BlockId, ChainError> {
        Ok(BlockId::from_digest(self.block_num(), self.digest()?))
    }
}

/// A header plus the producer's signature over the signing digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBlockHeader {
    pub header: BlockHeader,
    pub producer_signature: meridian_core::Signature,
}

/// A complete signed block: header and transaction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub signed_header: SignedBlockHeader,
    pub transactions: Vec<SignedTransaction>,
}

impl SignedBlock {
    pub fn new(signed_header: SignedBlockHeader, transactions: Vec<SignedTransaction>) -> Self {
        SignedBlock {
            signed_header,
            transactions,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.signed_header.header
    }

    pub fn block_num(&self) -> u64 {
        self.header().block_num()
    }

    pub fn id(&self) -> Result<BlockId, ChainError> {
        self.header().id()
    }

    /// Merkle root over the payload's transaction ids
    pub fn compute_transaction_mroot(&self) -> Result<Digest, ChainError> {
        let ids: Result<Vec<Digest>, ChainError> =
            self.transactions.iter().map(|trx| trx.id()).collect();
        Ok(merkle_root(&ids?))
    }

    /// Check the header's merkle root against the payload
    pub fn verify_transaction_mroot(&self) -> Result<(), ChainError> {
        if self.compute_transaction_mroot()? != self.header().transaction_mroot {
            return Err(ChainError::TransactionRootMismatch);
        }
        Ok(())
    }
}
