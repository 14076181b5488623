//! Hash commitments bound to a session

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::{Error, Result};

const COMMITMENT_DOMAIN: &[u8] = b"dkls23 hash commitment";

/// Hash commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

/// Opening randomness of a [`Commitment`]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct Witness(pub [u8; 32]);

impl Commitment {
    pub fn validate(&self) -> Result<()> {
        if self.0 == [0u8; 32] {
            return Err(Error::Missing("empty commitment".into()));
        }
        Ok(())
    }
}

impl Witness {
    pub fn validate(&self) -> Result<()> {
        if self.0 == [0u8; 32] {
            return Err(Error::Missing("empty witness".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Witness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Witness(..)")
    }
}

fn digest(session_id: &[u8], witness: &Witness, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(COMMITMENT_DOMAIN);
    hasher.update((session_id.len() as u64).to_be_bytes());
    hasher.update(session_id);
    hasher.update(witness.0);
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Commit to `parts` under `session_id`.
pub fn commit(
    session_id: &[u8],
    rng: &mut impl CryptoRngCore,
    parts: &[&[u8]],
) -> (Commitment, Witness) {
    let mut randomness = [0u8; 32];
    rng.fill_bytes(&mut randomness);
    let witness = Witness(randomness);
    (Commitment(digest(session_id, &witness, parts)), witness)
}

/// Check that `witness` opens `commitment` to `parts` under `session_id`.
pub fn open(
    session_id: &[u8],
    commitment: &Commitment,
    witness: &Witness,
    parts: &[&[u8]],
) -> Result<()> {
    commitment.validate()?;
    witness.validate()?;
    let recomputed = digest(session_id, witness, parts);
    if bool::from(recomputed.ct_eq(&commitment.0)) {
        Ok(())
    } else {
        Err(Error::VerificationFailed("commitment does not open".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_commit_open() {
        let sid = [3u8; 32];
        let (commitment, witness) = commit(&sid, &mut OsRng, &[b"hello", b"world"]);
        assert!(open(&sid, &commitment, &witness, &[b"hello", b"world"]).is_ok());
    }

    #[test]
    fn test_open_rejects_tampering() {
        let sid = [3u8; 32];
        let (commitment, witness) = commit(&sid, &mut OsRng, &[b"hello", b"world"]);

        assert!(open(&sid, &commitment, &witness, &[b"hello", b"there"]).is_err());
        assert!(open(&[4u8; 32], &commitment, &witness, &[b"hello", b"world"]).is_err());
        // part boundaries are bound too
        assert!(open(&sid, &commitment, &witness, &[b"hellowor", b"ld"]).is_err());
        assert!(open(&sid, &commitment, &Witness([1u8; 32]), &[b"hello", b"world"]).is_err());
    }

    #[test]
    fn test_empty_values_rejected() {
        let sid = [3u8; 32];
        let (commitment, _) = commit(&sid, &mut OsRng, &[b"x"]);
        let err = open(&sid, &commitment, &Witness([0u8; 32]), &[b"x"]).unwrap_err();
        assert!(matches!(err, Error::Missing(_)));
    }
}
