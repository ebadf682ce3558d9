use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use meridian_core::{verify, AccountName, BlockTimestamp, Digest};

use crate::block::{BlockHeader, BlockId, ProducerSchedule, SignedBlockHeader};
use crate::error::ChainError;

/// A snapshot of the header-state chain at one block.
///
/// Carries what the block-state layer extends it with: the chained id,
/// the accepted header, and the producer schedule together with the
/// activation digests handed to structural validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderState {
    pub id: BlockId,
    pub block_num: u64,
    pub header: SignedBlockHeader,
    pub active_schedule: ProducerSchedule,
    pub active_schedule_digests: BTreeSet<Digest>,
    pub pending_schedule_digests: Vec<Digest>,
}

impl HeaderState {
    /// The root header state for a chain starting from the given schedule.
    ///
    /// The genesis header is not produced or signed; its id chains from
    /// the zero id.
    pub fn genesis(timestamp: BlockTimestamp, active_schedule: ProducerSchedule) -> Result<Self, ChainError> {
        let header = BlockHeader {
            timestamp,
            producer: AccountName::default(),
            previous: BlockId::ZERO,
            transaction_mroot: Digest::ZERO,
            schedule_version: active_schedule.version,
        };
        let id = header.id()?;
        let block_num = header.block_num();
        Ok(HeaderState {
            id,
            block_num,
            header: SignedBlockHeader {
                header,
                producer_signature: meridian_core::Signature::default(),
            },
            active_schedule,
            active_schedule_digests: BTreeSet::new(),
            pending_schedule_digests: Vec::new(),
        })
    }

    pub fn timestamp(&self) -> BlockTimestamp {
        self.header.header.timestamp
    }

    /// Open the successor state for the next block.
    ///
    /// The timestamp must advance and the producer must hold a slot in
    /// the active schedule. At most one pending state exists at a time;
    /// that discipline belongs to the caller.
    pub fn next(
        &self,
        timestamp: BlockTimestamp,
        producer: AccountName,
    ) -> Result<PendingHeaderState, ChainError> {
        if timestamp <= self.timestamp() {
            return Err(ChainError::TimestampNotAdvancing {
                prev: self.timestamp(),
                got: timestamp,
            });
        }
        if self.active_schedule.signing_key(producer).is_none() {
            return Err(ChainError::UnknownProducer(producer));
        }

        Ok(PendingHeaderState {
            previous: self.id,
            block_num: self.block_num + 1,
            timestamp,
            producer,
            active_schedule: self.active_schedule.clone(),
            active_schedule_digests: self.active_schedule_digests.clone(),
            pending_schedule_digests: self.pending_schedule_digests.clone(),
        })
    }
}

/// The in-progress successor of a header state, consumed when the block
/// for its slot is adopted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingHeaderState {
    pub previous: BlockId,
    pub block_num: u64,
    pub timestamp: BlockTimestamp,
    pub producer: AccountName,
    pub active_schedule: ProducerSchedule,
    pub active_schedule_digests: BTreeSet<Digest>,
    pub pending_schedule_digests: Vec<Digest>,
}

impl PendingHeaderState {
    /// The digest a producer signs for a header built on this state;
    /// commits to the header and the active schedule.
    pub fn sig_digest(&self, header: &BlockHeader) -> Result<Digest, ChainError> {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(header.digest()?.as_bytes());
        data.extend_from_slice(self.active_schedule.digest()?.as_bytes());
        Ok(Digest::of(&data))
    }

    /// Check that a header belongs to this pending slot
    pub(crate) fn check_header(&self, header: &BlockHeader) -> Result<(), ChainError> {
        if header.previous != self.previous {
            return Err(ChainError::UnlinkableBlock {
                expected: self.previous,
                got: header.previous,
            });
        }
        if header.timestamp != self.timestamp {
            return Err(ChainError::HeaderMismatch(format!(
                "timestamp slot {} does not match pending slot {}",
                header.timestamp.slot(),
                self.timestamp.slot()
            )));
        }
        if header.producer != self.producer {
            return Err(ChainError::HeaderMismatch(format!(
                "producer {} does not match pending producer {}",
                header.producer, self.producer
            )));
        }
        if header.schedule_version != self.active_schedule.version {
            return Err(ChainError::HeaderMismatch(format!(
                "schedule version {} does not match active version {}",
                header.schedule_version, self.active_schedule.version
            )));
        }
        Ok(())
    }

    /// Verify the producer's signature over the signing digest
    pub fn verify_signee(&self, signed_header: &SignedBlockHeader) -> Result<(), ChainError> {
        let key = self
            .active_schedule
            .signing_key(self.producer)
            .ok_or(ChainError::UnknownProducer(self.producer))?;
        let digest = self.sig_digest(&signed_header.header)?;
        verify(
            &key,
            digest.as_bytes(),
            &signed_header.producer_signature,
        )
        .map_err(|_| ChainError::WrongSignee)
    }

    /// Finalize the transition into the accepted header state
    pub fn finish(self, header: SignedBlockHeader) -> Result<HeaderState, ChainError> {
        let id = header.header.id()?;
        Ok(HeaderState {
            id,
            block_num: self.block_num,
            header,
            active_schedule: self.active_schedule,
            active_schedule_digests: self.active_schedule_digests,
            pending_schedule_digests: self.pending_schedule_digests,
        })
    }
}
