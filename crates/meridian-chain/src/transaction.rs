use std::sync::Arc;

use serde::{Deserialize, Serialize};

use meridian_core::{serialize, sign, AccountName, Digest, SecretKey, Signature, TimePoint};

use crate::error::ChainError;

/// A single action addressed to an account's code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub account: AccountName,
    pub name: AccountName,
    pub data: Vec<u8>,
}

/// A signed user transaction as carried in a block body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub expiration: TimePoint,
    pub actions: Vec<Action>,
    pub signatures: Vec<Signature>,
}

/// Transaction data covered by signatures and the id (excludes them)
#[derive(Serialize)]
struct TransactionSigningData<'a> {
    expiration: TimePoint,
    actions: &'a [Action],
}

impl SignedTransaction {
    pub fn new(expiration: TimePoint, actions: Vec<Action>) -> Self {
        SignedTransaction {
            expiration,
            actions,
            signatures: Vec::new(),
        }
    }

    fn signing_bytes(&self) -> Result<Vec<u8>, ChainError> {
        Ok(serialize::pack(&TransactionSigningData {
            expiration: self.expiration,
            actions: &self.actions,
        })?)
    }

    /// Append a signature over the transaction body
    pub fn sign(&mut self, secret_key: &SecretKey) -> Result<(), ChainError> {
        let bytes = self.signing_bytes()?;
        self.signatures.push(sign(secret_key, &bytes));
        Ok(())
    }

    /// The transaction id: digest of the body, independent of signatures
    pub fn id(&self) -> Result<Digest, ChainError> {
        Ok(Digest::of(&self.signing_bytes()?))
    }
}

/// A parsed transaction handle, cached beside the block that carries it.
///
/// Shared by reference so a popped block's transactions can be requeued
/// for execution without re-parsing the block body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    id: Digest,
    trx: SignedTransaction,
}

impl TransactionMetadata {
    pub fn new(trx: SignedTransaction) -> Result<Arc<Self>, ChainError> {
        let id = trx.id()?;
        Ok(Arc::new(TransactionMetadata { id, trx }))
    }

    pub fn id(&self) -> Digest {
        self.id
    }

    pub fn transaction(&self) -> &SignedTransaction {
        &self.trx
    }

    /// Parse a whole block body's worth of transactions
    pub fn from_transactions(
        trxs: &[SignedTransaction],
    ) -> Result<Vec<Arc<TransactionMetadata>>, ChainError> {
        trxs.iter()
            .map(|trx| TransactionMetadata::new(trx.clone()))
            .collect()
    }
}
