use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use meridian_core::{BlockTimestamp, Digest, Signature};

use crate::block::{BlockId, SignedBlock};
use crate::error::ChainError;
use crate::header_state::{HeaderState, PendingHeaderState};
use crate::transaction::TransactionMetadata;

/// A block adopted into the chain: the header state it extends, the full
/// signed block, and the parsed transactions cached alongside.
///
/// `trxs` duplicates data inside the block body so that popping the block
/// off the active chain recaptures its transactions without re-parsing.
/// `validated` is monotone: it starts false on the speculative path and
/// is only ever promoted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockState {
    header_state: HeaderState,
    block: SignedBlock,
    validated: bool,
    #[serde(skip)]
    trxs: Vec<Arc<TransactionMetadata>>,
}

impl BlockState {
    /// Extend an existing header state with an externally produced signed
    /// block.
    ///
    /// Checks id chaining, timestamp monotonicity, producer scheduling and
    /// the transaction merkle root, runs the caller's structural
    /// validator, and verifies the producer signature unless
    /// `skip_validate_signee` (already-trusted blocks). Transactions are
    /// parsed out of the block body. On success the state is validated.
    pub fn from_header_state<V>(
        prev: &HeaderState,
        block: SignedBlock,
        validator: V,
        skip_validate_signee: bool,
    ) -> Result<Self, ChainError>
    where
        V: Fn(BlockTimestamp, &BTreeSet<Digest>, &[Digest]) -> Result<(), ChainError>,
    {
        let pending = prev.next(block.header().timestamp, block.header().producer)?;
        Self::assemble(pending, block, None, validator, skip_validate_signee, true)
    }

    /// Produce a brand-new block on the pending header state.
    ///
    /// Runs the validator, signs the header digest through the caller's
    /// signer, checks the resulting signature against the scheduled
    /// producer key, and finalizes the header-state transition.
    pub fn produce<V, S>(
        cur: PendingHeaderState,
        mut block: SignedBlock,
        trx_metas: Vec<Arc<TransactionMetadata>>,
        validator: V,
        signer: S,
    ) -> Result<Self, ChainError>
    where
        V: Fn(BlockTimestamp, &BTreeSet<Digest>, &[Digest]) -> Result<(), ChainError>,
        S: Fn(&Digest) -> Result<Signature, ChainError>,
    {
        let digest = cur.sig_digest(block.header())?;
        block.signed_header.producer_signature = signer(&digest)?;
        Self::assemble(cur, block, Some(trx_metas), validator, false, true)
    }

    /// Adopt a received signed block together with its already-parsed
    /// transactions.
    ///
    /// Used when the signature was checked upstream or skip-checks mode is
    /// configured. The state starts unvalidated and is promoted through
    /// `mark_validated` once the block has been fully applied.
    pub fn from_pending<V>(
        cur: PendingHeaderState,
        block: SignedBlock,
        trx_metas: Vec<Arc<TransactionMetadata>>,
        validator: V,
        skip_validate_signee: bool,
    ) -> Result<Self, ChainError>
    where
        V: Fn(BlockTimestamp, &BTreeSet<Digest>, &[Digest]) -> Result<(), ChainError>,
    {
        Self::assemble(
            cur,
            block,
            Some(trx_metas),
            validator,
            skip_validate_signee,
            false,
        )
    }

    /// The root state for a chain started from a genesis header state;
    /// nothing to verify, the genesis block is trusted by definition.
    pub fn genesis(header_state: HeaderState, block: SignedBlock) -> Self {
        BlockState {
            header_state,
            block,
            validated: true,
            trxs: Vec::new(),
        }
    }

    fn assemble<V>(
        pending: PendingHeaderState,
        block: SignedBlock,
        trx_metas: Option<Vec<Arc<TransactionMetadata>>>,
        validator: V,
        skip_validate_signee: bool,
        validated: bool,
    ) -> Result<Self, ChainError>
    where
        V: Fn(BlockTimestamp, &BTreeSet<Digest>, &[Digest]) -> Result<(), ChainError>,
    {
        pending.check_header(block.header())?;
        validator(
            pending.timestamp,
            &pending.active_schedule_digests,
            &pending.pending_schedule_digests,
        )?;
        block.verify_transaction_mroot()?;
        if !skip_validate_signee {
            pending.verify_signee(&block.signed_header)?;
        }

        let trxs = match trx_metas {
            Some(metas) => metas,
            None => TransactionMetadata::from_transactions(&block.transactions)?,
        };

        let header_state = pending.finish(block.signed_header.clone())?;
        debug!(
            block_num = header_state.block_num,
            id = %header_state.id,
            validated,
            "block state assembled"
        );
        Ok(BlockState {
            header_state,
            block,
            validated,
            trxs,
        })
    }

    pub fn header_state(&self) -> &HeaderState {
        &self.header_state
    }

    pub fn id(&self) -> BlockId {
        self.header_state.id
    }

    pub fn block_num(&self) -> u64 {
        self.header_state.block_num
    }

    pub fn timestamp(&self) -> BlockTimestamp {
        self.header_state.timestamp()
    }

    /// The owned signed block; immutable once constructed
    pub fn signed_block(&self) -> &SignedBlock {
        &self.block
    }

    /// The cached transaction handles, in block order
    pub fn transactions(&self) -> &[Arc<TransactionMetadata>] {
        &self.trxs
    }

    pub fn is_valid(&self) -> bool {
        self.validated
    }

    /// Promote to validated after the block has been fully applied.
    /// Monotone: never resets.
    pub fn mark_validated(&mut self) {
        self.validated = true;
    }

    /// Re-parse the cached transactions from the block body; used after
    /// deserialization, which does not persist the redundant cache.
    pub fn restore_transactions(&mut self) -> Result<(), ChainError> {
        self.trxs = TransactionMetadata::from_transactions(&self.block.transactions)?;
        Ok(())
    }
}
