//! Core types for DKLs23 protocol

use std::cmp::Ordering;
use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_256};
use zeroize::Zeroize;

/// Session identifier, the output of AgreeOnRandom
pub type SessionId = [u8; 32];

/// Canonical 1-based index of a cohort member
pub type SharingId = u32;

/// Symmetric pairwise seed
pub type Seed = [u8; 32];

/// Public verification key identifying a protocol participant.
///
/// Ordered by key bytes; this order defines sharing ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey(VerifyingKey);

impl IdentityKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> crate::Result<Self> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| crate::Error::InvalidArgument(format!("invalid identity key: {e}")))
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Fixed-width digest of the key.
    pub fn fingerprint(&self) -> [u8; 32] {
        Sha3_256::new()
            .chain_update(b"dkls23 identity key")
            .chain_update(self.0.as_bytes())
            .finalize()
            .into()
    }
}

impl Ord for IdentityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl PartialOrd for IdentityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0.as_bytes()[..8]))
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({self})")
    }
}

impl Serialize for IdentityKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.0.as_bytes())
    }
}

impl<'de> Deserialize<'de> for IdentityKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid identity key length"))?;
        VerifyingKey::from_bytes(&array)
            .map(IdentityKey)
            .map_err(serde::de::Error::custom)
    }
}

/// Private key of a participant; its verifying key is the [`IdentityKey`].
#[derive(Clone)]
pub struct AuthKey(SigningKey);

impl AuthKey {
    pub fn random(rng: &mut impl CryptoRngCore) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(SigningKey::from_bytes(bytes))
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey(self.0.verifying_key())
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthKey").field(&self.identity_key()).finish()
    }
}

/// ECDSA signature (r, s)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component
    pub r: [u8; 32],
    /// S component, always in low-s form
    pub s: [u8; 32],
    /// Recovery ID: bit 0 is the y-parity of R, bit 1 is set when R.x >= n
    pub recovery_id: u8,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Convert to bytes (r || s)
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }

    /// Convert to bytes (r || s || v)
    pub fn to_recoverable_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&self.to_bytes());
        bytes[64] = self.recovery_id;
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_identity_key_serde() {
        let identity = AuthKey::random(&mut OsRng).identity_key();
        let json = serde_json::to_string(&identity).unwrap();
        let decoded: IdentityKey = serde_json::from_str(&json).unwrap();
        assert_eq!(identity, decoded);
        assert_eq!(identity.fingerprint(), decoded.fingerprint());
    }

    #[test]
    fn test_identity_order_follows_key_bytes() {
        let a = AuthKey::random(&mut OsRng).identity_key();
        let b = AuthKey::random(&mut OsRng).identity_key();
        assert_eq!(a.cmp(&b), a.to_bytes().cmp(&b.to_bytes()));
    }

    #[test]
    fn test_signature_bytes() {
        let sig = Signature::new([1u8; 32], [2u8; 32], 1);
        let bytes = sig.to_recoverable_bytes();
        assert_eq!(&bytes[..32], &[1u8; 32]);
        assert_eq!(&bytes[32..64], &[2u8; 32]);
        assert_eq!(bytes[64], 1);
    }
}
