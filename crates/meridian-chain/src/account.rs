use serde::{Deserialize, Serialize};

use meridian_core::{serialize, AbiDefinition, AccountName, BlockTimestamp, Digest, TimePoint};
use meridian_db::{Entity, EntityId};

use crate::error::ChainError;

/// An on-chain account: its name, creation slot, and packed ABI blob.
///
/// The name is set at construction and has no mutator, so a store-level
/// modify cannot change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: EntityId<Account>,
    name: AccountName,
    creation_date: BlockTimestamp,
    abi: Vec<u8>,
}

impl Account {
    pub fn new(id: EntityId<Account>, name: AccountName, creation_date: BlockTimestamp) -> Self {
        Account {
            id,
            name,
            creation_date,
            abi: Vec::new(),
        }
    }

    pub fn name(&self) -> AccountName {
        self.name
    }

    pub fn creation_date(&self) -> BlockTimestamp {
        self.creation_date
    }

    /// The packed ABI bytes; empty until `set_abi` is called
    pub fn abi_blob(&self) -> &[u8] {
        &self.abi
    }

    /// Pack a definition into the blob, replacing any prior value
    pub fn set_abi(&mut self, abi: &AbiDefinition) -> Result<(), ChainError> {
        self.abi = serialize::pack(abi)?;
        Ok(())
    }

    pub(crate) fn set_abi_blob(&mut self, blob: Vec<u8>) {
        self.abi = blob;
    }

    /// Unpack the stored ABI definition.
    ///
    /// Fails with `AbiNotFound` when no ABI has been set. Read-only.
    pub fn get_abi(&self) -> Result<AbiDefinition, ChainError> {
        if self.abi.is_empty() {
            return Err(ChainError::AbiNotFound(self.name));
        }
        Ok(serialize::unpack(&self.abi)?)
    }
}

impl Entity for Account {
    type Key = AccountName;

    const TABLE_NAME: &'static str = "account";
    const FIELDS: &'static [&'static str] = &["name", "creation_date", "abi"];

    fn id(&self) -> EntityId<Account> {
        self.id
    }

    fn key(&self) -> AccountName {
        self.name
    }
}

/// Named capability bits carried by account metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AccountFlag {
    Privileged = 1 << 0,
}

/// A typed bitset over the metadata flags field.
///
/// Stored as a plain u32 so future capabilities extend the same field
/// without changing the persisted layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccountFlags(u32);

impl AccountFlags {
    pub const fn empty() -> Self {
        AccountFlags(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        AccountFlags(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, flag: AccountFlag) -> bool {
        self.0 & flag as u32 != 0
    }

    pub fn set(&mut self, flag: AccountFlag, value: bool) {
        if value {
            self.0 |= flag as u32;
        } else {
            self.0 &= !(flag as u32);
        }
    }
}

/// Per-account bookkeeping: sequence counters, deployed-code identity,
/// and capability flags.
///
/// The counters start at zero and are advanced only by the external
/// mutation operations that own them (auth change, code deploy, ABI set,
/// receipt count); the store never auto-increments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountMetadata {
    id: EntityId<AccountMetadata>,
    name: AccountName,
    pub recv_sequence: u64,
    pub auth_sequence: u64,
    pub code_sequence: u64,
    pub abi_sequence: u64,
    pub code_hash: Digest,
    pub last_code_update: TimePoint,
    pub flags: AccountFlags,
    pub vm_type: u8,
    pub vm_version: u8,
}

impl AccountMetadata {
    pub fn new(id: EntityId<AccountMetadata>, name: AccountName) -> Self {
        AccountMetadata {
            id,
            name,
            recv_sequence: 0,
            auth_sequence: 0,
            code_sequence: 0,
            abi_sequence: 0,
            code_hash: Digest::ZERO,
            last_code_update: TimePoint::default(),
            flags: AccountFlags::empty(),
            vm_type: 0,
            vm_version: 0,
        }
    }

    pub fn name(&self) -> AccountName {
        self.name
    }

    pub fn is_privileged(&self) -> bool {
        self.flags.contains(AccountFlag::Privileged)
    }

    pub fn set_privileged(&mut self, privileged: bool) {
        self.flags.set(AccountFlag::Privileged, privileged);
    }
}

impl Entity for AccountMetadata {
    type Key = AccountName;

    const TABLE_NAME: &'static str = "account_metadata";
    const FIELDS: &'static [&'static str] = &[
        "name",
        "recv_sequence",
        "auth_sequence",
        "code_sequence",
        "abi_sequence",
        "code_hash",
        "last_code_update",
        "flags",
        "vm_type",
        "vm_version",
    ];

    fn id(&self) -> EntityId<AccountMetadata> {
        self.id
    }

    fn key(&self) -> AccountName {
        self.name
    }
}

/// A compensating RAM-billing adjustment for one account.
///
/// The correction value is computed and applied by the resource-billing
/// layer; this record only stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRamCorrection {
    id: EntityId<AccountRamCorrection>,
    name: AccountName,
    pub ram_correction: u64,
}

impl AccountRamCorrection {
    pub fn new(id: EntityId<AccountRamCorrection>, name: AccountName, ram_correction: u64) -> Self {
        AccountRamCorrection {
            id,
            name,
            ram_correction,
        }
    }

    pub fn name(&self) -> AccountName {
        self.name
    }
}

impl Entity for AccountRamCorrection {
    type Key = AccountName;

    const TABLE_NAME: &'static str = "account_ram_correction";
    const FIELDS: &'static [&'static str] = &["name", "ram_correction"];

    fn id(&self) -> EntityId<AccountRamCorrection> {
        self.id
    }

    fn key(&self) -> AccountName {
        self.name
    }
}
