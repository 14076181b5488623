//! Fiat-Shamir Schnorr proof of knowledge of a discrete logarithm.

use elliptic_curve::{ff::Field, group::Group};
use merlin::Transcript;
use rand_core::CryptoRngCore;

use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::transcript::TranscriptProtocol;

/// The label we use for hashing the statement.
const STATEMENT_LABEL: &[u8] = b"dlog proof statement";
/// The label we use for hashing the first prover message.
const COMMITMENT_LABEL: &[u8] = b"dlog proof commitment";
/// The label we use for generating the challenge.
const CHALLENGE_LABEL: &[u8] = b"dlog proof challenge";

/// Proof that the prover knows `x` with `x * G = public`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proof<C: EcdsaCurve> {
    e: Scalar<C>,
    s: Scalar<C>,
}

/// Prove knowledge of `secret`, the discrete log of `public`.
///
/// The transcript must carry the session binding; the verifier needs an
/// identical one.
pub fn prove<C: EcdsaCurve>(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    public: &Point<C>,
    secret: &Scalar<C>,
) -> Proof<C> {
    transcript.append_point::<C>(STATEMENT_LABEL, public);

    let k = Scalar::<C>::random(&mut *rng);
    let big_k = Point::<C>::generator() * k;
    transcript.append_point::<C>(COMMITMENT_LABEL, &big_k);

    let e = transcript.challenge_scalar::<C>(CHALLENGE_LABEL);
    let s = k + e * secret;
    Proof { e, s }
}

/// Verify a proof produced by [`prove`].
#[must_use]
pub fn verify<C: EcdsaCurve>(transcript: &mut Transcript, public: &Point<C>, proof: &Proof<C>) -> bool {
    transcript.append_point::<C>(STATEMENT_LABEL, public);

    let big_k = Point::<C>::generator() * proof.s - *public * proof.e;
    transcript.append_point::<C>(COMMITMENT_LABEL, &big_k);

    let e = transcript.challenge_scalar::<C>(CHALLENGE_LABEL);
    e == proof.e
}
