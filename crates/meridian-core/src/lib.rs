//! Meridian Core - Foundational types, cryptography, and the codec service
//!
//! This crate provides account names, chain timestamps, ABI definitions,
//! digests/signatures, and the pack/unpack codec shared by the state layer.

pub mod abi;
pub mod crypto;
pub mod error;
pub mod name;
pub mod serialize;
pub mod time;

pub use abi::{AbiDefinition, ActionDef, FieldDef, StructDef, TableDef, TypeDef};
pub use crypto::{merkle_root, sign, verify, Digest, KeyPair, PublicKey, SecretKey, Signature};
pub use error::CoreError;
pub use name::AccountName;
pub use time::{BlockTimestamp, TimePoint};
