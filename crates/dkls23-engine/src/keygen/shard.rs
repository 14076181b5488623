//! Key material produced by DKG and its BIP32 derivation.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use derivation_path::{ChildIndex, DerivationPath};
use elliptic_curve::{ff::Field, group::Group};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use tracing::{debug, instrument};
use zeroize::Zeroize;

use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::math::{evaluate_commitment, lagrange_coefficient};
use crate::oblivious::{ReceiverRotOutput, SenderRotOutput};
use crate::participants::CohortConfig;
use crate::types::{IdentityKey, SharingId};
use crate::zero::PairwiseSeeds;
use crate::{Error, Result};

/// BIP32 chain code
pub type ChainCode = [u8; 32];

/// This participant's Shamir share of the signing key.
#[derive(Clone)]
pub struct SigningKeyShare<C: EcdsaCurve> {
    pub share: Scalar<C>,
    pub public_key: Point<C>,
}

impl<C: EcdsaCurve> SigningKeyShare<C> {
    pub fn validate(&self) -> Result<()> {
        if bool::from(self.share.is_zero()) {
            return Err(Error::InvalidArgument("zero key share".into()));
        }
        if bool::from(self.public_key.is_identity()) {
            return Err(Error::InvalidArgument("identity public key".into()));
        }
        Ok(())
    }

    /// Additive share for signing with the quorum `ids`.
    pub fn additive_share(&self, my_id: SharingId, ids: &[SharingId]) -> Result<Scalar<C>> {
        Ok(lagrange_coefficient::<C>(my_id, ids)? * self.share)
    }
}

impl<C: EcdsaCurve> Drop for SigningKeyShare<C> {
    fn drop(&mut self) {
        self.share.zeroize();
    }
}

impl<C: EcdsaCurve> std::fmt::Debug for SigningKeyShare<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyShare")
            .field("public_key", &hex::encode(C::point_to_bytes(&self.public_key)))
            .finish_non_exhaustive()
    }
}

/// Public side of the sharing: joint Feldman vector and every partial public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyShares<C: EcdsaCurve> {
    pub public_key: Point<C>,
    pub feldman_commitments: Vec<Point<C>>,
    pub shares: BTreeMap<SharingId, Point<C>>,
}

impl<C: EcdsaCurve> PublicKeyShares<C> {
    pub fn validate(&self, cohort: &CohortConfig<C>) -> Result<()> {
        if self.feldman_commitments.len() != cohort.threshold() {
            return Err(Error::InvalidArgument(format!(
                "Feldman vector has {} entries, expected {}",
                self.feldman_commitments.len(),
                cohort.threshold()
            )));
        }
        if self.feldman_commitments[0] != self.public_key {
            return Err(Error::InvalidArgument(
                "public key does not match Feldman vector".into(),
            ));
        }
        let expected: BTreeSet<SharingId> = cohort.sharing_config().iter().map(|(id, _)| id).collect();
        if !self.shares.keys().copied().eq(expected.iter().copied()) {
            return Err(Error::InvalidArgument("partial public keys do not cover the cohort".into()));
        }
        for (id, point) in &self.shares {
            if *point != evaluate_commitment::<C>(&self.feldman_commitments, *id) {
                return Err(Error::InvalidArgument(format!(
                    "partial public key {id} does not match Feldman vector"
                )));
            }
        }
        Ok(())
    }

    /// Partial public key of `id`.
    pub fn share(&self, id: SharingId) -> Result<&Point<C>> {
        self.shares
            .get(&id)
            .ok_or_else(|| Error::Missing(format!("no partial public key for {id}")))
    }
}

/// Base OTs with one counterparty, one batch in each direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseOtPair {
    /// We are the base-OT sender; used when we play Bob.
    pub as_sender: SenderRotOutput,
    /// We are the base-OT receiver; used when we play Alice.
    pub as_receiver: ReceiverRotOutput,
}

pub type PairwiseBaseOts = BTreeMap<IdentityKey, BaseOtPair>;

/// A participant's complete DKG output.
#[derive(Debug, Clone)]
pub struct Shard<C: EcdsaCurve> {
    cohort: CohortConfig<C>,
    my_identity: IdentityKey,
    signing_key_share: SigningKeyShare<C>,
    public_key_shares: PublicKeyShares<C>,
    pairwise_seeds: PairwiseSeeds,
    pairwise_base_ots: PairwiseBaseOts,
}

impl<C: EcdsaCurve> Shard<C> {
    pub fn new(
        cohort: CohortConfig<C>,
        my_identity: IdentityKey,
        signing_key_share: SigningKeyShare<C>,
        public_key_shares: PublicKeyShares<C>,
        pairwise_seeds: PairwiseSeeds,
        pairwise_base_ots: PairwiseBaseOts,
    ) -> Result<Self> {
        let shard = Self {
            cohort,
            my_identity,
            signing_key_share,
            public_key_shares,
            pairwise_seeds,
            pairwise_base_ots,
        };
        shard.validate()?;
        Ok(shard)
    }

    /// Checks the shard against its cohort.
    pub fn validate(&self) -> Result<()> {
        self.cohort.validate()?;
        let others: BTreeSet<IdentityKey> = self
            .cohort
            .participants()
            .iter()
            .filter(|identity| **identity != self.my_identity)
            .copied()
            .collect();
        if others.len() + 1 != self.cohort.total() {
            return Err(Error::InvalidArgument(format!(
                "{} is not in the cohort",
                self.my_identity
            )));
        }
        if !self.pairwise_seeds.keys().eq(others.iter()) {
            return Err(Error::InvalidArgument("pairwise seeds do not cover the cohort".into()));
        }
        if !self.pairwise_base_ots.keys().eq(others.iter()) {
            return Err(Error::InvalidArgument("base OTs do not cover the cohort".into()));
        }
        for base_ots in self.pairwise_base_ots.values() {
            base_ots.as_sender.validate()?;
            base_ots.as_receiver.validate()?;
        }

        self.signing_key_share.validate()?;
        self.public_key_shares.validate(&self.cohort)?;
        if self.signing_key_share.public_key != self.public_key_shares.public_key {
            return Err(Error::InvalidArgument("public key mismatch".into()));
        }
        let my_public_share = self.public_key_shares.share(self.sharing_id()?)?;
        if Point::<C>::generator() * self.signing_key_share.share != *my_public_share {
            return Err(Error::InvalidArgument(
                "key share does not match its partial public key".into(),
            ));
        }
        Ok(())
    }

    pub fn cohort(&self) -> &CohortConfig<C> {
        &self.cohort
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.my_identity
    }

    pub fn sharing_id(&self) -> Result<SharingId> {
        self.cohort.sharing_config().sharing_id(&self.my_identity)
    }

    pub fn public_key(&self) -> &Point<C> {
        &self.public_key_shares.public_key
    }

    pub fn signing_key_share(&self) -> &SigningKeyShare<C> {
        &self.signing_key_share
    }

    pub fn public_key_shares(&self) -> &PublicKeyShares<C> {
        &self.public_key_shares
    }

    pub fn pairwise_seeds(&self) -> &PairwiseSeeds {
        &self.pairwise_seeds
    }

    pub fn base_ots(&self, counterparty: &IdentityKey) -> Result<&BaseOtPair> {
        self.pairwise_base_ots
            .get(counterparty)
            .ok_or_else(|| Error::Missing(format!("no base OTs with {counterparty}")))
    }

    /// Non-hardened BIP32 child of this shard.
    #[instrument(skip_all, fields(index = index))]
    pub fn derive(&self, chain_code: &ChainCode, index: u32) -> Result<DerivedShard<C>> {
        if index >= HARDENED_OFFSET {
            return Err(Error::Derivation(format!(
                "hardened index {index} requires the private key"
            )));
        }

        let mut mac = Hmac::<Sha512>::new_from_slice(chain_code)
            .map_err(|e| Error::Derivation(e.to_string()))?;
        mac.update(&C::point_to_bytes(self.public_key()));
        mac.update(&index.to_be_bytes());
        let mut output = [0u8; 64];
        output.copy_from_slice(&mac.finalize().into_bytes());

        let tweak = C::scalar_from_bytes(&output[..32])
            .ok_or_else(|| Error::Derivation(format!("invalid tweak at index {index}")))?;
        let mut child_chain_code = [0u8; 32];
        child_chain_code.copy_from_slice(&output[32..]);
        output.zeroize();

        let shard = self.shift(&tweak)?;
        debug!(
            public_key = %hex::encode(C::point_to_bytes(shard.public_key())),
            "derived child shard"
        );
        Ok(DerivedShard {
            shard,
            chain_code: child_chain_code,
        })
    }

    /// Add `tweak` to the shared secret.
    fn shift(&self, tweak: &Scalar<C>) -> Result<Self> {
        let offset = Point::<C>::generator() * tweak;
        let mut shard = self.clone();
        shard.signing_key_share.share += tweak;
        shard.signing_key_share.public_key += offset;

        let public = &mut shard.public_key_shares;
        public.public_key += offset;
        public.feldman_commitments[0] += offset;
        for point in public.shares.values_mut() {
            *point += offset;
        }

        if bool::from(shard.public_key().is_identity()) {
            return Err(Error::Derivation("derived key is the identity".into()));
        }
        Ok(shard)
    }
}

/// First hardened child index.
pub const HARDENED_OFFSET: u32 = 1 << 31;

/// A shard together with the chain code it was derived under.
#[derive(Debug, Clone)]
pub struct DerivedShard<C: EcdsaCurve> {
    shard: Shard<C>,
    chain_code: ChainCode,
}

impl<C: EcdsaCurve> DerivedShard<C> {
    /// Root of a derivation tree.
    pub fn new(shard: Shard<C>, chain_code: ChainCode) -> Self {
        Self { shard, chain_code }
    }

    pub fn shard(&self) -> &Shard<C> {
        &self.shard
    }

    pub fn into_shard(self) -> Shard<C> {
        self.shard
    }

    pub fn chain_code(&self) -> &ChainCode {
        &self.chain_code
    }

    pub fn derive(&self, index: u32) -> Result<Self> {
        self.shard.derive(&self.chain_code, index)
    }

    /// Derive along a path such as `m/0/1`.
    pub fn derive_path(&self, path: &str) -> Result<Self> {
        let path = DerivationPath::from_str(path)
            .map_err(|e| Error::Derivation(format!("invalid path {path}: {e}")))?;
        path.path().iter().try_fold(self.clone(), |derived, child| match child {
            ChildIndex::Normal(index) => derived.derive(*index),
            ChildIndex::Hardened(index) => Err(Error::Derivation(format!(
                "hardened index {index}' requires the private key"
            ))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::trusted_dealer;
    use crate::math::interpolate_at_zero;
    use crate::testing::identities;
    use k256::Secp256k1;
    use rand::rngs::OsRng;

    fn hex32(s: &str) -> [u8; 32] {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    fn reconstruct(shards: &[DerivedShard<Secp256k1>]) -> k256::Scalar {
        let shares: Vec<_> = shards
            .iter()
            .map(|derived| {
                let shard = derived.shard();
                (shard.sharing_id().unwrap(), shard.signing_key_share().share)
            })
            .collect();
        interpolate_at_zero::<Secp256k1>(&shares).unwrap()
    }

    #[test]
    fn test_bip32_child_vector() {
        let secret = Secp256k1::scalar_from_bytes(&hex32(
            "4b03d6fc340455b363f51020ad3ecca4f0850280cf436c70c727923f6db46c3e",
        ))
        .unwrap();
        let chain_code = hex32("60499f801b896d83179a4374aeb7822aaeaceaa0db1f85ee3e904c4defbd9689");

        let (_, ids) = identities(3);
        let cohort = CohortConfig::<Secp256k1>::new(ids, 2, None).unwrap();
        let shards = trusted_dealer::deal(&cohort, &secret, &mut OsRng).unwrap();

        let children: Vec<_> = shards
            .values()
            .map(|shard| shard.derive(&chain_code, 0).unwrap())
            .collect();
        for child in &children {
            child.shard().validate().unwrap();
            assert_eq!(
                hex::encode(child.chain_code()),
                "f0909affaa7ee7abe5dd4e100598d4dc53cd709d5a5c2cac40e7412f232f7c9c"
            );
            assert_eq!(
                hex::encode(Secp256k1::point_to_bytes(child.shard().public_key())),
                "02fc9e5af0ac8d9b3cecfe2a888e2117ba3d089d8585886c9c826b6b22a98d12ea"
            );
        }

        let child_secret = reconstruct(&children[..2]);
        assert_eq!(
            hex::encode(Secp256k1::scalar_to_bytes(&child_secret)),
            "abe74a98f6c7eabee0428f53798f0ab8aa1bd37873999041703c742f15ac7e1e"
        );
        assert_eq!(reconstruct(&children[1..]), child_secret);
    }

    #[test]
    fn test_derive_path_matches_steps() {
        let (_, ids) = identities(3);
        let cohort = CohortConfig::<Secp256k1>::new(ids, 2, None).unwrap();
        let secret = k256::Scalar::random(&mut OsRng);
        let shards = trusted_dealer::deal(&cohort, &secret, &mut OsRng).unwrap();
        let root = DerivedShard::new(shards.values().next().unwrap().clone(), [7u8; 32]);

        let stepwise = root.derive(0).unwrap().derive(1).unwrap();
        let by_path = root.derive_path("m/0/1").unwrap();
        assert_eq!(stepwise.chain_code(), by_path.chain_code());
        assert_eq!(stepwise.shard().public_key(), by_path.shard().public_key());

        assert!(matches!(root.derive(HARDENED_OFFSET), Err(Error::Derivation(_))));
        assert!(matches!(root.derive_path("m/0'"), Err(Error::Derivation(_))));
        assert!(matches!(root.derive_path("not a path"), Err(Error::Derivation(_))));
    }

    #[test]
    fn test_validate_rejects_wrong_share() {
        let (_, ids) = identities(3);
        let cohort = CohortConfig::<Secp256k1>::new(ids, 2, None).unwrap();
        let secret = k256::Scalar::random(&mut OsRng);
        let shards = trusted_dealer::deal(&cohort, &secret, &mut OsRng).unwrap();
        let mut shard = shards.values().next().unwrap().clone();
        shard.validate().unwrap();

        shard.signing_key_share.share += k256::Scalar::ONE;
        assert!(shard.validate().is_err());
    }
}
