use thiserror::Error;

use meridian_core::{AccountName, BlockTimestamp, CoreError};
use meridian_db::DbError;

use crate::block::BlockId;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("No ABI set on account {0}")]
    AbiNotFound(AccountName),

    #[error("Unlinkable block: expected previous {expected}, got {got}")]
    UnlinkableBlock { expected: BlockId, got: BlockId },

    #[error("Block timestamp {got:?} does not advance past {prev:?}")]
    TimestampNotAdvancing {
        prev: BlockTimestamp,
        got: BlockTimestamp,
    },

    #[error("Producer {0} is not in the active schedule")]
    UnknownProducer(AccountName),

    #[error("Transaction merkle root does not match the block header")]
    TransactionRootMismatch,

    #[error("Block is not signed by the scheduled producer key")]
    WrongSignee,

    #[error("Block header is inconsistent with the pending header state: {0}")]
    HeaderMismatch(String),

    #[error("Block validation failed: {0}")]
    Validation(String),

    #[error("Cannot pop the root of the retained chain")]
    PopRoot,

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Codec error: {0}")]
    Codec(#[from] CoreError),
}

impl ChainError {
    /// Whether this is an expected rejection of an untrusted block.
    ///
    /// Validation failures are frequent when processing network input and
    /// the caller simply discards the block; anything else indicates a
    /// caller bug or an internal fault and must not be swallowed.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            ChainError::UnlinkableBlock { .. }
                | ChainError::TimestampNotAdvancing { .. }
                | ChainError::UnknownProducer(_)
                | ChainError::TransactionRootMismatch
                | ChainError::WrongSignee
                | ChainError::HeaderMismatch(_)
                | ChainError::Validation(_)
        )
    }
}
