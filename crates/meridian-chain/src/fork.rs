use std::collections::VecDeque;

use tracing::{debug, info};

use crate::block_state::BlockState;
use crate::error::ChainError;

/// Retention settings for the block-state chain
#[derive(Debug, Clone)]
pub struct ForkChainConfig {
    /// How many blocks behind the head are kept for fork switches and
    /// replay before being discarded as a unit
    pub retained_history_depth: u64,
}

impl Default for ForkChainConfig {
    fn default() -> Self {
        ForkChainConfig {
            retained_history_depth: 3600,
        }
    }
}

/// The retained chain of block states ending at the head.
///
/// Fork switches pop blocks off the head (recapturing their cached
/// transactions for re-execution) and push the replacement branch. The
/// chain is seeded with a root block state and never drains below it.
#[derive(Debug)]
pub struct ForkChain {
    config: ForkChainConfig,
    blocks: VecDeque<BlockState>,
}

impl ForkChain {
    pub fn new(root: BlockState, config: ForkChainConfig) -> Self {
        info!(block_num = root.block_num(), id = %root.id(), "fork chain rooted");
        let mut blocks = VecDeque::new();
        blocks.push_back(root);
        ForkChain { config, blocks }
    }

    /// The newest retained block state
    pub fn head(&self) -> Option<&BlockState> {
        self.blocks.back()
    }

    /// The oldest retained block state
    pub fn root(&self) -> Option<&BlockState> {
        self.blocks.front()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Look up a retained block state by number
    pub fn get(&self, block_num: u64) -> Option<&BlockState> {
        let front = self.root()?.block_num();
        if block_num < front {
            return None;
        }
        self.blocks.get((block_num - front) as usize)
    }

    /// Extend the chain with a block state built on the current head
    pub fn push(&mut self, block_state: BlockState) -> Result<(), ChainError> {
        if let Some(head) = self.blocks.back() {
            let previous = block_state.header_state().header.header.previous;
            if previous != head.id() {
                return Err(ChainError::UnlinkableBlock {
                    expected: head.id(),
                    got: previous,
                });
            }
        }

        debug!(
            block_num = block_state.block_num(),
            id = %block_state.id(),
            validated = block_state.is_valid(),
            "block state pushed"
        );
        self.blocks.push_back(block_state);
        self.prune();
        Ok(())
    }

    /// Remove and return the head for a fork switch.
    ///
    /// The caller recaptures the popped block's `transactions()` for
    /// re-execution without re-parsing the body. The root of the retained
    /// chain cannot be popped.
    pub fn pop(&mut self) -> Result<BlockState, ChainError> {
        if self.blocks.len() <= 1 {
            return Err(ChainError::PopRoot);
        }
        let popped = self.blocks.pop_back().ok_or(ChainError::PopRoot)?;
        debug!(block_num = popped.block_num(), id = %popped.id(), "block state popped");
        Ok(popped)
    }

    /// Promote the head after its block has been fully applied
    pub fn mark_head_validated(&mut self) {
        if let Some(head) = self.blocks.back_mut() {
            head.mark_validated();
        }
    }

    /// Discard whole block states below the retained-history depth
    fn prune(&mut self) {
        let Some(head_num) = self.head().map(|h| h.block_num()) else {
            return;
        };
        while self.blocks.len() > 1 {
            let Some(front_num) = self.root().map(|r| r.block_num()) else {
                return;
            };
            if head_num - front_num < self.config.retained_history_depth {
                break;
            }
            self.blocks.pop_front();
            debug!(block_num = front_num, "block state pruned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{
        BlockHeader, ProducerKey, ProducerSchedule, SignedBlock, SignedBlockHeader,
    };
    use crate::header_state::HeaderState;
    use crate::transaction::{Action, SignedTransaction, TransactionMetadata};
    use meridian_core::{
        merkle_root, sign, AccountName, BlockTimestamp, Digest, KeyPair, TimePoint,
    };
    use std::collections::BTreeSet;

    fn name(s: &str) -> AccountName {
        s.parse().unwrap()
    }

    fn ok_validator(
        _: BlockTimestamp,
        _: &BTreeSet<Digest>,
        _: &[Digest],
    ) -> Result<(), ChainError> {
        Ok(())
    }

    struct Harness {
        chain: ForkChain,
        producer: KeyPair,
    }

    fn harness(depth: u64) -> Harness {
        let producer = KeyPair::generate();
        let schedule = ProducerSchedule {
            version: 0,
            producers: vec![ProducerKey {
                producer_name: name("prodalpha"),
                signing_key: producer.public,
            }],
        };
        let genesis_header =
            HeaderState::genesis(BlockTimestamp::from_slot(0), schedule).unwrap();
        let genesis_block = SignedBlock::new(genesis_header.header.clone(), Vec::new());
        let root = BlockState::genesis(genesis_header, genesis_block);
        Harness {
            chain: ForkChain::new(
                root,
                ForkChainConfig {
                    retained_history_depth: depth,
                },
            ),
            producer,
        }
    }

    fn sample_transaction(tag: u8) -> SignedTransaction {
        SignedTransaction::new(
            TimePoint::from_millis(1_000 + tag as i64),
            vec![Action {
                account: name("token"),
                name: name("transfer"),
                data: vec![tag],
            }],
        )
    }

    fn next_block_state(h: &Harness, transactions: Vec<SignedTransaction>) -> BlockState {
        let prev = h.chain.head().unwrap().header_state();
        let pending = prev
            .next(prev.timestamp().next(), name("prodalpha"))
            .unwrap();
        let ids: Vec<Digest> = transactions.iter().map(|t| t.id().unwrap()).collect();
        let header = BlockHeader {
            timestamp: pending.timestamp,
            producer: pending.producer,
            previous: pending.previous,
            transaction_mroot: merkle_root(&ids),
            schedule_version: 0,
        };
        let digest = pending.sig_digest(&header).unwrap();
        let block = SignedBlock::new(
            SignedBlockHeader {
                producer_signature: sign(&h.producer.secret, digest.as_bytes()),
                header,
            },
            transactions,
        );
        BlockState::from_header_state(prev, block, ok_validator, false).unwrap()
    }

    #[test]
    fn test_push_and_head() {
        let mut h = harness(100);
        let bs = next_block_state(&h, vec![sample_transaction(1)]);
        let id = bs.id();

        h.chain.push(bs).unwrap();
        assert_eq!(h.chain.head().unwrap().id(), id);
        assert_eq!(h.chain.len(), 2);
    }

    #[test]
    fn test_push_unlinkable_rejected() {
        let mut h = harness(100);
        let bs = next_block_state(&h, Vec::new());
        let orphan = next_block_state(&h, vec![sample_transaction(1)]);
        h.chain.push(bs).unwrap();

        // `orphan` still chains from the old head
        let err = h.chain.push(orphan).unwrap_err();
        assert!(matches!(err, ChainError::UnlinkableBlock { .. }));
        assert_eq!(h.chain.len(), 2);
    }

    #[test]
    fn test_pop_recaptures_transactions() {
        let mut h = harness(100);
        let transactions = vec![sample_transaction(1), sample_transaction(2)];
        let bs = next_block_state(&h, transactions.clone());
        h.chain.push(bs).unwrap();

        let popped = h.chain.pop().unwrap();
        let reparsed = TransactionMetadata::from_transactions(&transactions).unwrap();
        assert_eq!(popped.transactions().len(), reparsed.len());
        for (cached, fresh) in popped.transactions().iter().zip(&reparsed) {
            assert_eq!(cached.id(), fresh.id());
        }
        assert_eq!(h.chain.len(), 1);
    }

    #[test]
    fn test_cannot_pop_root() {
        let mut h = harness(100);
        assert!(matches!(h.chain.pop(), Err(ChainError::PopRoot)));
    }

    #[test]
    fn test_prune_discards_old_blocks() {
        let mut h = harness(3);
        for _ in 0..5 {
            let bs = next_block_state(&h, Vec::new());
            h.chain.push(bs).unwrap();
        }

        // Head is genesis+5; only blocks within depth 3 of the head remain
        let head_num = h.chain.head().unwrap().block_num();
        assert_eq!(head_num, 6);
        assert_eq!(h.chain.root().unwrap().block_num(), head_num - 2);
        assert_eq!(h.chain.len(), 3);
        assert!(h.chain.get(1).is_none());
        assert!(h.chain.get(head_num).is_some());
    }

    #[test]
    fn test_mark_head_validated() {
        let mut h = harness(100);
        let prev = h.chain.head().unwrap().header_state().clone();
        let pending = prev
            .next(prev.timestamp().next(), name("prodalpha"))
            .unwrap();
        let transactions = vec![sample_transaction(1)];
        let ids: Vec<Digest> = transactions.iter().map(|t| t.id().unwrap()).collect();
        let header = BlockHeader {
            timestamp: pending.timestamp,
            producer: pending.producer,
            previous: pending.previous,
            transaction_mroot: merkle_root(&ids),
            schedule_version: 0,
        };
        let digest = pending.sig_digest(&header).unwrap();
        let block = SignedBlock::new(
            SignedBlockHeader {
                producer_signature: sign(&h.producer.secret, digest.as_bytes()),
                header,
            },
            transactions.clone(),
        );
        let trx_metas = TransactionMetadata::from_transactions(&transactions).unwrap();
        let speculative =
            BlockState::from_pending(pending, block, trx_metas, ok_validator, false).unwrap();
        assert!(!speculative.is_valid());

        h.chain.push(speculative).unwrap();
        assert!(!h.chain.head().unwrap().is_valid());
        h.chain.mark_head_validated();
        assert!(h.chain.head().unwrap().is_valid());
    }
}
