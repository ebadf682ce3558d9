//! Meridian Chain - The chain state layer
//!
//! Account-family entities stored in the versioned entity store, the
//! header/block state records that extend the header-state chain, and the
//! retained fork chain supporting block application and pop.

pub mod account;
pub mod block;
pub mod block_state;
pub mod error;
pub mod fork;
pub mod header_state;
pub mod state_db;
pub mod transaction;

pub use account::{Account, AccountFlag, AccountFlags, AccountMetadata, AccountRamCorrection};
pub use block::{
    BlockHeader, BlockId, ProducerKey, ProducerSchedule, SignedBlock, SignedBlockHeader,
};
pub use block_state::BlockState;
pub use error::ChainError;
pub use fork::{ForkChain, ForkChainConfig};
pub use header_state::{HeaderState, PendingHeaderState};
pub use state_db::{StateDb, StateSnapshot};
pub use transaction::{Action, SignedTransaction, TransactionMetadata};
