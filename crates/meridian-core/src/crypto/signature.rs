use ed25519_dalek::{Signature as DalekSignature, Signer, Verifier};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::fmt;

use crate::crypto::keys::{PublicKey, SecretKey};
use crate::error::CoreError;

/// Ed25519 signature (64 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "BigArray")] pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(slice);
        Some(Signature(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes).ok_or(CoreError::InvalidSignature)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature([0u8; 64])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Sign a message with a secret key
pub fn sign(secret_key: &SecretKey, message: &[u8]) -> Signature {
    let signature = secret_key.signing_key().sign(message);
    Signature(signature.to_bytes())
}

/// Verify a signature against a public key and message
pub fn verify(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), CoreError> {
    let verifying_key = public_key.to_verifying_key()?;
    let dalek_sig = DalekSignature::from_bytes(&signature.0);
    verifying_key
        .verify(message, &dalek_sig)
        .map_err(|_| CoreError::InvalidSignature)
}
