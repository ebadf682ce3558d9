pub mod digest;
pub mod keys;
pub mod signature;

pub use digest::{merkle_root, Digest};
pub use keys::{KeyPair, PublicKey, SecretKey};
pub use signature::{sign, verify, Signature};
