//! Distributed Signature Generation (DSG) module
//!
//! - [`Cosigner`]: three rounds, the last one takes the message
//! - [`PreSigner`]: the same three rounds without a message, producing
//!   [`PreProcessingMaterial`] that is later turned into a partial signature
//! - [`Aggregator`]: combines partial signatures into a verified ECDSA signature

mod interactive;
mod messages;
mod noninteractive;

pub use interactive::Cosigner;
pub use messages::*;
pub use noninteractive::{produce_partial_signature, PreProcessingMaterial, PreSigner};

use std::collections::BTreeSet;

use elliptic_curve::{ff::Field, group::Group, scalar::IsHigh};
use tracing::{debug, instrument};

use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::keygen::Shard;
use crate::messages::{RoundMessages, Validate};
use crate::participants::CohortConfig;
use crate::types::{IdentityKey, Signature};
use crate::{Error, Result};

/// One cosigner's contribution to a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialSignature<C: EcdsaCurve> {
    pub u: Scalar<C>,
    pub w: Scalar<C>,
    pub big_r: Point<C>,
}

impl<C: EcdsaCurve> Validate for PartialSignature<C> {
    fn validate(&self) -> Result<()> {
        if bool::from(self.u.is_zero()) || bool::from(self.w.is_zero()) {
            return Err(Error::InvalidArgument("zero partial signature".into()));
        }
        if bool::from(self.big_r.is_identity()) {
            return Err(Error::InvalidArgument("identity nonce point".into()));
        }
        Ok(())
    }
}

/// Combine partial signatures into a low-s ECDSA signature and verify it.
#[instrument(skip_all, fields(signers = partials.len()))]
pub fn aggregate<C: EcdsaCurve>(
    public_key: &Point<C>,
    message: &[u8],
    partials: &RoundMessages<PartialSignature<C>>,
) -> Result<Signature> {
    if partials.is_empty() {
        return Err(Error::Missing("no partial signatures".into()));
    }
    partials.validate_from(partials.keys().collect::<Vec<_>>())?;

    let mut big_r = Point::<C>::identity();
    let mut u = Scalar::<C>::ZERO;
    let mut w = Scalar::<C>::ZERO;
    for (_, partial) in partials {
        big_r += partial.big_r;
        u += partial.u;
        w += partial.w;
    }

    let u_inv: Option<Scalar<C>> = u.invert().into();
    let u_inv = u_inv.ok_or_else(|| Error::Failed("partial signatures sum to zero".into()))?;
    let mut s = w * u_inv;
    if bool::from(s.is_zero()) {
        return Err(Error::Failed("zero signature".into()));
    }

    let (y_is_odd, x_reduced) = C::recovery_bits(&big_r);
    let mut recovery_id = u8::from(y_is_odd) | (u8::from(x_reduced) << 1);
    if bool::from(s.is_high()) {
        s = -s;
        recovery_id ^= 1;
    }

    let signature = Signature::new(
        C::scalar_to_bytes(&C::x_coordinate(&big_r)),
        C::scalar_to_bytes(&s),
        recovery_id,
    );
    verify::<C>(public_key, message, &signature)?;
    debug!(r = %hex::encode(signature.r), "signature aggregated");
    Ok(signature)
}

/// Verify an ECDSA signature over the SHA-256 digest of `message`.
pub fn verify<C: EcdsaCurve>(public_key: &Point<C>, message: &[u8], signature: &Signature) -> Result<()> {
    let r = C::scalar_from_bytes(&signature.r)
        .ok_or_else(|| Error::VerificationFailed("r out of range".into()))?;
    let s = C::scalar_from_bytes(&signature.s)
        .ok_or_else(|| Error::VerificationFailed("s out of range".into()))?;
    if bool::from(r.is_zero()) {
        return Err(Error::VerificationFailed("zero r".into()));
    }
    let s_inv: Option<Scalar<C>> = s.invert().into();
    let s_inv = s_inv.ok_or_else(|| Error::VerificationFailed("zero s".into()))?;

    let e = C::hash_message(message);
    let big_r = Point::<C>::generator() * (e * s_inv) + *public_key * (r * s_inv);
    if bool::from(big_r.is_identity()) || C::x_coordinate(&big_r) != r {
        return Err(Error::VerificationFailed("signature does not verify".into()));
    }
    Ok(())
}

/// Aggregates partial signatures on behalf of a cohort member.
pub struct Aggregator<C: EcdsaCurve> {
    cohort: CohortConfig<C>,
    public_key: Point<C>,
}

impl<C: EcdsaCurve> Aggregator<C> {
    /// Fails if the shard's owner is not a configured aggregator.
    pub fn new(shard: &Shard<C>) -> Result<Self> {
        if !shard.cohort().is_aggregator(shard.identity_key()) {
            return Err(Error::InvalidArgument(format!(
                "{} is not an aggregator",
                shard.identity_key()
            )));
        }
        Ok(Self {
            cohort: shard.cohort().clone(),
            public_key: *shard.public_key(),
        })
    }

    pub fn public_key(&self) -> &Point<C> {
        &self.public_key
    }

    pub fn aggregate(
        &self,
        message: &[u8],
        partials: &RoundMessages<PartialSignature<C>>,
    ) -> Result<Signature> {
        let signers: BTreeSet<IdentityKey> = partials.keys().copied().collect();
        self.cohort.validate_quorum(&signers)?;
        aggregate::<C>(&self.public_key, message, partials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{identities, run_dkg, run_presigning, run_signing};
    use crate::types::AuthKey;
    use elliptic_curve::group::Curve;
    use k256::Secp256k1;
    use p256::NistP256;
    use rand::rngs::OsRng;

    const MESSAGE: &[u8] = b"Hello, DKLs23!";

    fn check_signing<C: EcdsaCurve>(t: usize, n: usize) -> (Point<C>, Signature) {
        let (shards, keys) = run_dkg::<C>(t, n).unwrap();
        let quorum: BTreeSet<IdentityKey> =
            keys.iter().take(t).map(AuthKey::identity_key).collect();
        let partials = run_signing(&shards, &keys, &quorum, MESSAGE).unwrap();

        let signer = quorum.iter().next().unwrap();
        let aggregator = Aggregator::new(&shards[signer]).unwrap();
        let signature = aggregator.aggregate(MESSAGE, &partials).unwrap();
        (*aggregator.public_key(), signature)
    }

    #[test]
    fn test_sign_secp256k1() {
        use k256::ecdsa::signature::Verifier;

        for (t, n) in [(2, 2), (2, 3), (3, 5)] {
            let (public_key, signature) = check_signing::<Secp256k1>(t, n);
            let verifying_key = k256::ecdsa::VerifyingKey::from_affine(public_key.to_affine()).unwrap();
            let ecdsa = k256::ecdsa::Signature::from_slice(&signature.to_bytes()).unwrap();
            assert!(ecdsa.normalize_s().is_none(), "signature must be low-s");
            verifying_key.verify(MESSAGE, &ecdsa).unwrap();

            let recovery_id = k256::ecdsa::RecoveryId::from_byte(signature.recovery_id).unwrap();
            let recovered =
                k256::ecdsa::VerifyingKey::recover_from_msg(MESSAGE, &ecdsa, recovery_id).unwrap();
            assert_eq!(recovered, verifying_key);
        }
    }

    #[test]
    fn test_sign_p256() {
        use p256::ecdsa::signature::Verifier;

        let (public_key, signature) = check_signing::<NistP256>(2, 3);
        let verifying_key = p256::ecdsa::VerifyingKey::from_affine(public_key.to_affine()).unwrap();
        let ecdsa = p256::ecdsa::Signature::from_slice(&signature.to_bytes()).unwrap();
        verifying_key.verify(MESSAGE, &ecdsa).unwrap();
    }

    #[test]
    fn test_presign_then_sign() {
        use k256::ecdsa::signature::Verifier;

        let (shards, keys) = run_dkg::<Secp256k1>(2, 3).unwrap();
        let quorum: BTreeSet<IdentityKey> =
            keys.iter().skip(1).map(AuthKey::identity_key).collect();
        let materials = run_presigning(&shards, &keys, &quorum).unwrap();

        let partials: RoundMessages<_> = materials
            .into_iter()
            .map(|(id, material)| {
                let partial = produce_partial_signature(material, &shards[&id], MESSAGE).unwrap();
                (id, partial)
            })
            .collect();

        let public_key = *shards.values().next().unwrap().public_key();
        let signature = aggregate::<Secp256k1>(&public_key, MESSAGE, &partials).unwrap();
        let verifying_key = k256::ecdsa::VerifyingKey::from_affine(public_key.to_affine()).unwrap();
        let ecdsa = k256::ecdsa::Signature::from_slice(&signature.to_bytes()).unwrap();
        verifying_key.verify(MESSAGE, &ecdsa).unwrap();
    }

    #[test]
    fn test_wrong_message_fails_verification() {
        let (shards, keys) = run_dkg::<Secp256k1>(2, 2).unwrap();
        let quorum: BTreeSet<IdentityKey> = keys.iter().map(AuthKey::identity_key).collect();
        let partials = run_signing(&shards, &keys, &quorum, MESSAGE).unwrap();

        let public_key = *shards.values().next().unwrap().public_key();
        let err = aggregate::<Secp256k1>(&public_key, b"another message", &partials).unwrap_err();
        assert!(matches!(err, Error::VerificationFailed(_)));
    }

    #[test]
    fn test_aggregator_restrictions() {
        let (keys, ids) = identities(3);
        let only = keys[0].identity_key();
        let cohort =
            CohortConfig::<Secp256k1>::new(ids, 2, Some([only].into_iter().collect())).unwrap();
        let shards = crate::keygen::trusted_dealer::deal(&cohort, &k256::Scalar::ONE, &mut OsRng)
            .unwrap();

        assert!(Aggregator::new(&shards[&only]).is_ok());
        assert!(Aggregator::new(&shards[&keys[1].identity_key()]).is_err());

        let aggregator = Aggregator::new(&shards[&only]).unwrap();
        let partial = PartialSignature::<Secp256k1> {
            u: k256::Scalar::ONE,
            w: k256::Scalar::ONE,
            big_r: k256::ProjectivePoint::GENERATOR,
        };
        let too_few: RoundMessages<_> = [(only, partial)].into_iter().collect();
        assert!(aggregator.aggregate(MESSAGE, &too_few).is_err());
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let (public_key, mut signature) = check_signing::<Secp256k1>(2, 2);
        verify::<Secp256k1>(&public_key, MESSAGE, &signature).unwrap();

        signature.s[31] ^= 1;
        assert!(verify::<Secp256k1>(&public_key, MESSAGE, &signature).is_err());
        signature.s = [0u8; 32];
        assert!(verify::<Secp256k1>(&public_key, MESSAGE, &signature).is_err());
    }
}
