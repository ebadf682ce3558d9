use serde::{Deserialize, Serialize};
use tracing::info;

use meridian_core::{serialize, AbiDefinition, AccountName, BlockTimestamp};
use meridian_db::{Entity, EntityId, Session, Table, TableSnapshot, UndoStack};

use crate::account::{Account, AccountMetadata, AccountRamCorrection};
use crate::error::ChainError;

/// The chain-state database: one table per entity kind, mutated under
/// nested undo sessions that span all of them.
///
/// Mutation discipline is strictly session based; block application opens
/// a session, squashes it on success and drops it (auto-undo) on failure.
#[derive(Debug, Clone)]
pub struct StateDb {
    accounts: Table<Account>,
    account_metadata: Table<AccountMetadata>,
    ram_corrections: Table<AccountRamCorrection>,
}

impl Default for StateDb {
    fn default() -> Self {
        StateDb::new()
    }
}

impl StateDb {
    pub fn new() -> Self {
        StateDb {
            accounts: Table::new(),
            account_metadata: Table::new(),
            ram_corrections: Table::new(),
        }
    }

    pub fn accounts(&self) -> &Table<Account> {
        &self.accounts
    }

    pub fn accounts_mut(&mut self) -> &mut Table<Account> {
        &mut self.accounts
    }

    pub fn account_metadata(&self) -> &Table<AccountMetadata> {
        &self.account_metadata
    }

    pub fn account_metadata_mut(&mut self) -> &mut Table<AccountMetadata> {
        &mut self.account_metadata
    }

    pub fn ram_corrections(&self) -> &Table<AccountRamCorrection> {
        &self.ram_corrections
    }

    pub fn ram_corrections_mut(&mut self) -> &mut Table<AccountRamCorrection> {
        &mut self.ram_corrections
    }

    /// Begin a reversible mutation scope spanning every table
    pub fn start_undo_session(&mut self) -> Session<'_, StateDb> {
        Session::new(self)
    }

    /// Create the account record and its metadata row together.
    ///
    /// If the metadata insert fails the account insert is rolled back, so
    /// the pair is created atomically or not at all.
    pub fn create_account(
        &mut self,
        name: AccountName,
        when: BlockTimestamp,
    ) -> Result<EntityId<Account>, ChainError> {
        let account_id = self.accounts.emplace(|id| Account::new(id, name, when))?;
        if let Err(err) = self
            .account_metadata
            .emplace(|id| AccountMetadata::new(id, name))
        {
            self.accounts.remove(account_id)?;
            return Err(err.into());
        }
        Ok(account_id)
    }

    pub fn find_account(&self, name: AccountName) -> Option<&Account> {
        self.accounts.find(&name)
    }

    pub fn get_account(&self, name: AccountName) -> Result<&Account, ChainError> {
        Ok(self.accounts.get(&name)?)
    }

    pub fn get_account_metadata(&self, name: AccountName) -> Result<&AccountMetadata, ChainError> {
        Ok(self.account_metadata.get(&name)?)
    }

    /// Pack and store an account's ABI, replacing any prior value
    pub fn set_abi(&mut self, name: AccountName, abi: &AbiDefinition) -> Result<(), ChainError> {
        let id = self.get_account(name)?.id();
        let blob = serialize::pack(abi)?;
        self.accounts.modify(id, |account| account.set_abi_blob(blob))?;
        Ok(())
    }

    /// Unpack an account's stored ABI
    pub fn get_abi(&self, name: AccountName) -> Result<AbiDefinition, ChainError> {
        self.get_account(name)?.get_abi()
    }

    /// Dump every table in id order under its schema version
    pub fn snapshot(&self) -> StateSnapshot {
        info!(
            accounts = self.accounts.len(),
            metadata = self.account_metadata.len(),
            ram_corrections = self.ram_corrections.len(),
            "writing state snapshot"
        );
        StateSnapshot {
            accounts: self.accounts.snapshot(),
            account_metadata: self.account_metadata.snapshot(),
            ram_corrections: self.ram_corrections.snapshot(),
        }
    }

    /// Rebuild the database from a snapshot, verifying each table's schema
    pub fn restore(snapshot: StateSnapshot) -> Result<Self, ChainError> {
        let db = StateDb {
            accounts: Table::restore(snapshot.accounts)?,
            account_metadata: Table::restore(snapshot.account_metadata)?,
            ram_corrections: Table::restore(snapshot.ram_corrections)?,
        };
        info!(accounts = db.accounts.len(), "state restored from snapshot");
        Ok(db)
    }

    /// Snapshot packed through the codec service
    pub fn write_snapshot(&self) -> Result<Vec<u8>, ChainError> {
        Ok(serialize::pack(&self.snapshot())?)
    }

    /// Restore from codec-packed snapshot bytes
    pub fn read_snapshot(bytes: &[u8]) -> Result<Self, ChainError> {
        let snapshot: StateSnapshot = serialize::unpack(bytes)?;
        Self::restore(snapshot)
    }
}

impl UndoStack for StateDb {
    fn push_layer(&mut self) {
        self.accounts.push_layer();
        self.account_metadata.push_layer();
        self.ram_corrections.push_layer();
    }

    fn undo_layer(&mut self) {
        self.accounts.undo_layer();
        self.account_metadata.undo_layer();
        self.ram_corrections.undo_layer();
    }

    fn squash_layer(&mut self) {
        self.accounts.squash_layer();
        self.account_metadata.squash_layer();
        self.ram_corrections.squash_layer();
    }

    fn depth(&self) -> usize {
        self.accounts.depth()
    }
}

/// The ordered dump of every table; the persisted layout of chain state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub accounts: TableSnapshot<Account>,
    pub account_metadata: TableSnapshot<AccountMetadata>,
    pub ram_corrections: TableSnapshot<AccountRamCorrection>,
}
