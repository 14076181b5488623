//! Non-interactive signing: pre-sign without a message, sign offline later.

use std::collections::{BTreeMap, BTreeSet};

use elliptic_curve::{ff::Field, group::Group};
use rand_core::CryptoRngCore;
use tracing::{debug, instrument};
use zeroize::Zeroize;

use super::interactive::Cosigner;
use super::messages::*;
use super::PartialSignature;
use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::keygen::Shard;
use crate::messages::RoundMessages;
use crate::types::{AuthKey, IdentityKey, SessionId, SharingId};
use crate::{Error, Result};

/// Per-counterparty secrets of a pre-signature.
pub(crate) struct PrivateMaterial<C: EcdsaCurve> {
    pub(crate) r: Scalar<C>,
    pub(crate) phi: Scalar<C>,
    pub(crate) zeta: Scalar<C>,
    pub(crate) cu: BTreeMap<IdentityKey, Scalar<C>>,
    pub(crate) cv: BTreeMap<IdentityKey, Scalar<C>>,
    pub(crate) du: BTreeMap<IdentityKey, Scalar<C>>,
    pub(crate) dv: BTreeMap<IdentityKey, Scalar<C>>,
    pub(crate) psi: BTreeMap<IdentityKey, Scalar<C>>,
}

impl<C: EcdsaCurve> Drop for PrivateMaterial<C> {
    fn drop(&mut self) {
        self.r.zeroize();
        self.phi.zeroize();
        self.zeta.zeroize();
        for map in [
            &mut self.cu,
            &mut self.cv,
            &mut self.du,
            &mut self.dv,
            &mut self.psi,
        ] {
            for value in map.values_mut() {
                value.zeroize();
            }
        }
    }
}

/// Output of pre-signing, consumed by [`produce_partial_signature`].
///
/// Not `Clone`: a pre-signature must sign at most one message, and
/// consuming it by value makes reuse impossible.
pub struct PreProcessingMaterial<C: EcdsaCurve> {
    pre_signers: BTreeSet<IdentityKey>,
    my_identity: IdentityKey,
    private_material: PrivateMaterial<C>,
    pre_signature: BTreeMap<IdentityKey, Point<C>>,
}

impl<C: EcdsaCurve> PreProcessingMaterial<C> {
    pub(crate) fn new(
        pre_signers: BTreeSet<IdentityKey>,
        my_identity: IdentityKey,
        private_material: PrivateMaterial<C>,
        pre_signature: BTreeMap<IdentityKey, Point<C>>,
    ) -> Self {
        Self {
            pre_signers,
            my_identity,
            private_material,
            pre_signature,
        }
    }

    pub fn pre_signers(&self) -> &BTreeSet<IdentityKey> {
        &self.pre_signers
    }

    /// Nonce point `R_j` of every pre-signer.
    pub fn pre_signature(&self) -> &BTreeMap<IdentityKey, Point<C>> {
        &self.pre_signature
    }

    /// The joint nonce point `R`.
    pub fn big_r(&self) -> Point<C> {
        self.pre_signature.values().copied().sum()
    }

    /// Checks the material against the shard that will sign with it.
    pub fn validate(&self, shard: &Shard<C>) -> Result<()> {
        if self.my_identity != *shard.identity_key() {
            return Err(Error::InvalidArgument(
                "material belongs to another participant".into(),
            ));
        }
        if !self.pre_signers.contains(&self.my_identity) {
            return Err(Error::InvalidArgument("not a pre-signer".into()));
        }
        shard.cohort().validate_quorum(&self.pre_signers)?;

        if !self.pre_signature.keys().eq(self.pre_signers.iter()) {
            return Err(Error::Missing("nonce point of a pre-signer".into()));
        }
        if self
            .pre_signature
            .values()
            .any(|point| bool::from(point.is_identity()))
        {
            return Err(Error::InvalidArgument("identity nonce point".into()));
        }

        let private = &self.private_material;
        if bool::from(private.r.is_zero()) || bool::from(private.phi.is_zero()) {
            return Err(Error::InvalidArgument("zero nonce".into()));
        }
        let own = self
            .pre_signature
            .get(&self.my_identity)
            .ok_or_else(|| Error::Missing("own nonce point".into()))?;
        if *own != Point::<C>::generator() * private.r {
            return Err(Error::InvalidArgument("own nonce point does not match".into()));
        }

        let others: Vec<&IdentityKey> = self
            .pre_signers
            .iter()
            .filter(|identity| **identity != self.my_identity)
            .collect();
        for (name, map) in [
            ("c_u", &private.cu),
            ("c_v", &private.cv),
            ("d_u", &private.du),
            ("d_v", &private.dv),
            ("psi", &private.psi),
        ] {
            if !map.keys().eq(others.iter().copied()) {
                return Err(Error::Missing(format!("{name} for every counterparty")));
            }
        }
        Ok(())
    }
}

impl<C: EcdsaCurve> std::fmt::Debug for PreProcessingMaterial<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreProcessingMaterial")
            .field("pre_signers", &self.pre_signers)
            .field("my_identity", &self.my_identity)
            .finish_non_exhaustive()
    }
}

/// Sign `message` with pre-processed material. Needs no interaction.
#[instrument(skip_all, fields(identity = %material.my_identity))]
pub fn produce_partial_signature<C: EcdsaCurve>(
    material: PreProcessingMaterial<C>,
    shard: &Shard<C>,
    message: &[u8],
) -> Result<PartialSignature<C>> {
    material.validate(shard)?;

    let big_r = material.big_r();
    if bool::from(big_r.is_identity()) {
        return Err(Error::Failed("joint nonce point is the identity".into()));
    }
    let r_x = C::x_coordinate(&big_r);
    if bool::from(r_x.is_zero()) {
        return Err(Error::Failed("nonce x-coordinate is zero".into()));
    }

    let sharing = shard.cohort().sharing_config();
    let ids = material
        .pre_signers
        .iter()
        .map(|identity| sharing.sharing_id(identity))
        .collect::<Result<Vec<SharingId>>>()?;
    let private = &material.private_material;
    let mut sk = shard
        .signing_key_share()
        .additive_share(shard.sharing_id()?, &ids)?
        + private.zeta;

    let mut mask = private.phi + private.psi.values().sum::<Scalar<C>>();
    let mut u = private.r * mask;
    let mut v = sk * mask;
    for counterparty in private.cu.keys() {
        let pick = |map: &BTreeMap<IdentityKey, Scalar<C>>| {
            map.get(counterparty)
                .copied()
                .ok_or_else(|| Error::Missing(format!("material for {counterparty}")))
        };
        u += pick(&private.cu)? + pick(&private.du)?;
        v += pick(&private.cv)? + pick(&private.dv)?;
    }
    let w = C::hash_message(message) * private.phi + r_x * v;

    sk.zeroize();
    mask.zeroize();
    v.zeroize();
    debug!("partial signature computed");
    Ok(PartialSignature {
        u,
        w,
        big_r: Point::<C>::generator() * private.r,
    })
}

/// Runs the three signing rounds without a message.
pub struct PreSigner<C: EcdsaCurve>(Cosigner<C>);

impl<C: EcdsaCurve> PreSigner<C> {
    pub fn new(
        session_id: &SessionId,
        auth_key: &AuthKey,
        shard: &Shard<C>,
        pre_signers: &BTreeSet<IdentityKey>,
    ) -> Result<Self> {
        Cosigner::new(session_id, auth_key, shard, pre_signers).map(Self)
    }

    pub fn identity_key(&self) -> &IdentityKey {
        self.0.identity_key()
    }

    pub fn round1(&mut self, rng: &mut impl CryptoRngCore) -> Result<RoundMessages<Round1P2P>> {
        self.0.round1(rng)
    }

    pub fn round2(
        &mut self,
        p2p: &RoundMessages<Round1P2P>,
    ) -> Result<(Round2Broadcast<C>, RoundMessages<Round2P2P<C>>)> {
        self.0.round2(p2p)
    }

    #[instrument(skip_all, fields(identity = %self.0.identity_key(), round = 3))]
    pub fn round3(
        &mut self,
        broadcasts: &RoundMessages<Round2Broadcast<C>>,
        p2p: &RoundMessages<Round2P2P<C>>,
    ) -> Result<PreProcessingMaterial<C>> {
        let material = self.0.presign(broadcasts, p2p)?;
        material.validate(self.0.shard())?;
        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::aggregate;
    use crate::testing::{run_dkg, run_presigning};
    use crate::types::AuthKey;
    use k256::Secp256k1;

    #[test]
    fn test_material_is_checked_against_the_shard() {
        let (shards, keys) = run_dkg::<Secp256k1>(2, 3).unwrap();
        let quorum: BTreeSet<IdentityKey> = keys.iter().take(2).map(AuthKey::identity_key).collect();
        let mut materials = run_presigning(&shards, &keys, &quorum).unwrap();

        let ids: Vec<_> = quorum.iter().copied().collect();
        let material = materials.remove(&ids[0]).unwrap();
        assert!(material.validate(&shards[&ids[0]]).is_ok());
        assert_eq!(material.pre_signers(), &quorum);
        assert!(matches!(
            produce_partial_signature(material, &shards[&ids[1]], b"m"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_different_messages_from_separate_presignatures() {
        let (shards, keys) = run_dkg::<Secp256k1>(2, 2).unwrap();
        let quorum: BTreeSet<IdentityKey> = keys.iter().map(AuthKey::identity_key).collect();
        let public_key = *shards.values().next().unwrap().public_key();

        for message in [b"first".as_slice(), b"second".as_slice()] {
            let materials = run_presigning(&shards, &keys, &quorum).unwrap();
            let partials: RoundMessages<_> = materials
                .into_iter()
                .map(|(id, material)| {
                    (id, produce_partial_signature(material, &shards[&id], message).unwrap())
                })
                .collect();
            aggregate::<Secp256k1>(&public_key, message, &partials).unwrap();
        }
    }

    #[test]
    fn test_mixed_presignatures_do_not_verify() {
        let (shards, keys) = run_dkg::<Secp256k1>(2, 2).unwrap();
        let quorum: BTreeSet<IdentityKey> = keys.iter().map(AuthKey::identity_key).collect();
        let public_key = *shards.values().next().unwrap().public_key();

        let mut first = run_presigning(&shards, &keys, &quorum).unwrap();
        let mut second = run_presigning(&shards, &keys, &quorum).unwrap();
        let ids: Vec<_> = quorum.iter().copied().collect();

        let partials: RoundMessages<_> = [
            (ids[0], first.remove(&ids[0]).unwrap()),
            (ids[1], second.remove(&ids[1]).unwrap()),
        ]
        .into_iter()
        .map(|(id, material)| (id, produce_partial_signature(material, &shards[&id], b"m").unwrap()))
        .collect();
        assert!(aggregate::<Secp256k1>(&public_key, b"m", &partials).is_err());
    }
}
