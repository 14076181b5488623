//! Feldman VSS with committed broadcast, run by every DKG participant.
//!
//! Each dealer commits to its Feldman vector before anyone reveals one, so
//! no dealer can bias the joint public key after seeing the others.

use std::collections::BTreeMap;

use elliptic_curve::{ff::Field, group::Group};
use merlin::Transcript;
use rand_core::CryptoRngCore;
use tracing::{debug, info, instrument};
use zeroize::Zeroize;

use crate::commitments::{self, Commitment, Witness};
use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::keygen::{PublicKeyShares, SigningKeyShare};
use crate::math::{evaluate_commitment, Polynomial};
use crate::messages::{expect_round, RoundMessages, Validate};
use crate::participants::{CohortConfig, SharingConfig};
use crate::proofs::dlog;
use crate::transcript::TranscriptProtocol;
use crate::types::{IdentityKey, SessionId, SharingId};
use crate::{Error, Result};

const TRANSCRIPT_LABEL: &[u8] = b"dkls23 vss";
const DEALER_LABEL: &[u8] = b"vss dealer";

/// Round 1 broadcast: commitment to the dealer's Feldman vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Round1Broadcast {
    pub commitment: Commitment,
}

/// Round 1 P2P: the recipient's share of the dealer's polynomial.
#[derive(Clone, PartialEq, Eq)]
pub struct Round1P2P<C: EcdsaCurve> {
    pub share: Scalar<C>,
}

/// Round 2 broadcast: the opened Feldman vector and a proof of its constant term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round2Broadcast<C: EcdsaCurve> {
    pub feldman_commitments: Vec<Point<C>>,
    pub witness: Witness,
    pub proof: dlog::Proof<C>,
}

impl Validate for Round1Broadcast {
    fn validate(&self) -> Result<()> {
        self.commitment.validate()
    }
}

impl<C: EcdsaCurve> Validate for Round1P2P<C> {
    fn validate(&self) -> Result<()> {
        if bool::from(self.share.is_zero()) {
            return Err(Error::InvalidArgument("zero share".into()));
        }
        Ok(())
    }
}

impl<C: EcdsaCurve> Validate for Round2Broadcast<C> {
    fn validate(&self) -> Result<()> {
        self.witness.validate()?;
        if self.feldman_commitments.is_empty() {
            return Err(Error::Missing("empty Feldman vector".into()));
        }
        if self
            .feldman_commitments
            .iter()
            .any(|point| bool::from(point.is_identity()))
        {
            return Err(Error::InvalidArgument("identity Feldman commitment".into()));
        }
        Ok(())
    }
}

impl<C: EcdsaCurve> std::fmt::Debug for Round1P2P<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Round1P2P(..)")
    }
}

impl<C: EcdsaCurve> Drop for Round1P2P<C> {
    fn drop(&mut self) {
        self.share.zeroize();
    }
}

fn commitment_parts<C: EcdsaCurve>(dealer: &IdentityKey, feldman: &[Point<C>]) -> Vec<Vec<u8>> {
    std::iter::once(dealer.to_bytes().to_vec())
        .chain(feldman.iter().map(|point| C::point_to_bytes(point)))
        .collect()
}

/// VSS party: dealer of its own polynomial and receiver of everyone else's.
pub struct Participant<C: EcdsaCurve> {
    my_identity: IdentityKey,
    my_id: SharingId,
    sharing: SharingConfig,
    threshold: usize,
    session_id: SessionId,
    transcript: Transcript,
    round: u32,
    polynomial: Option<Polynomial<C>>,
    feldman_commitments: Vec<Point<C>>,
    witness: Option<Witness>,
    received_commitments: BTreeMap<IdentityKey, Commitment>,
    received_shares: BTreeMap<IdentityKey, Scalar<C>>,
}

impl<C: EcdsaCurve> Participant<C> {
    pub fn new(my_identity: IdentityKey, session_id: &SessionId, cohort: &CohortConfig<C>) -> Result<Self> {
        cohort.validate()?;
        let sharing = cohort.sharing_config();
        let my_id = sharing.sharing_id(&my_identity)?;

        let mut transcript = Transcript::new(TRANSCRIPT_LABEL);
        transcript.append_message(b"curve", C::NAME.as_bytes());
        let session_id = transcript.bind(session_id, b"vss");

        Ok(Self {
            my_identity,
            my_id,
            sharing,
            threshold: cohort.threshold(),
            session_id,
            transcript,
            round: 1,
            polynomial: None,
            feldman_commitments: Vec::new(),
            witness: None,
            received_commitments: BTreeMap::new(),
            received_shares: BTreeMap::new(),
        })
    }

    fn others(&self) -> impl Iterator<Item = (SharingId, &IdentityKey)> {
        let me = self.my_identity;
        self.sharing.iter().filter(move |(_, identity)| **identity != me)
    }

    fn dealer_transcript(&self, dealer: SharingId) -> Transcript {
        let mut transcript = self.transcript.clone();
        transcript.append_message(DEALER_LABEL, &dealer.to_be_bytes());
        transcript
    }

    /// Sample a polynomial, commit to its Feldman vector and deal shares.
    #[instrument(skip_all, fields(sharing_id = self.my_id))]
    pub fn round1(
        &mut self,
        rng: &mut impl CryptoRngCore,
    ) -> Result<(Round1Broadcast, RoundMessages<Round1P2P<C>>)> {
        expect_round(self.round, 1)?;
        let secret = Scalar::<C>::random(&mut *rng);
        let polynomial = Polynomial::<C>::random(rng, secret, self.threshold);
        let feldman = polynomial.commit();

        let parts = commitment_parts::<C>(&self.my_identity, &feldman);
        let parts: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        let (commitment, witness) = commitments::commit(&self.session_id, rng, &parts);

        let p2p = self
            .others()
            .map(|(id, identity)| {
                (
                    *identity,
                    Round1P2P {
                        share: polynomial.evaluate(id),
                    },
                )
            })
            .collect();

        self.polynomial = Some(polynomial);
        self.feldman_commitments = feldman;
        self.witness = Some(witness);
        self.round = 2;
        debug!("dealt shares");
        Ok((Round1Broadcast { commitment }, p2p))
    }

    /// Store commitments and shares, then reveal the Feldman vector.
    #[instrument(skip_all, fields(sharing_id = self.my_id))]
    pub fn round2(
        &mut self,
        rng: &mut impl CryptoRngCore,
        broadcasts: &RoundMessages<Round1Broadcast>,
        p2p: &RoundMessages<Round1P2P<C>>,
    ) -> Result<Round2Broadcast<C>> {
        expect_round(self.round, 2)?;
        let others: Vec<IdentityKey> = self.others().map(|(_, identity)| *identity).collect();
        broadcasts.validate_from(&others)?;
        p2p.validate_from(&others)?;

        for identity in &others {
            self.received_commitments
                .insert(*identity, broadcasts.get(identity)?.commitment);
            self.received_shares.insert(*identity, p2p.get(identity)?.share);
        }

        let polynomial = self
            .polynomial
            .as_ref()
            .ok_or_else(|| Error::Missing("polynomial".into()))?;
        let witness = self
            .witness
            .clone()
            .ok_or_else(|| Error::Missing("commitment witness".into()))?;
        let proof = dlog::prove::<C>(
            rng,
            &mut self.dealer_transcript(self.my_id),
            &self.feldman_commitments[0],
            polynomial.constant(),
        );

        self.round = 3;
        Ok(Round2Broadcast {
            feldman_commitments: self.feldman_commitments.clone(),
            witness,
            proof,
        })
    }

    /// Verify every dealer and sum the shares.
    #[instrument(skip_all, fields(sharing_id = self.my_id))]
    pub fn round3(
        &mut self,
        broadcasts: &RoundMessages<Round2Broadcast<C>>,
    ) -> Result<(SigningKeyShare<C>, PublicKeyShares<C>)> {
        expect_round(self.round, 3)?;
        let others: Vec<(SharingId, IdentityKey)> =
            self.others().map(|(id, identity)| (id, *identity)).collect();
        broadcasts.validate_from(others.iter().map(|(_, identity)| identity))?;

        let polynomial = self
            .polynomial
            .take()
            .ok_or_else(|| Error::Missing("polynomial".into()))?;
        let mut share = polynomial.evaluate(self.my_id);
        let mut combined = self.feldman_commitments.clone();

        for (dealer_id, dealer) in &others {
            let message = broadcasts.get(dealer)?;
            let feldman = &message.feldman_commitments;
            if feldman.len() != self.threshold {
                return Err(Error::abort(
                    dealer,
                    format!(
                        "Feldman vector has {} entries, expected {}",
                        feldman.len(),
                        self.threshold
                    ),
                ));
            }

            let commitment = self
                .received_commitments
                .get(dealer)
                .ok_or_else(|| Error::Missing(format!("commitment from {dealer}")))?;
            let parts = commitment_parts::<C>(dealer, feldman);
            let parts: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
            commitments::open(&self.session_id, commitment, &message.witness, &parts)
                .map_err(|e| Error::abort(dealer, e.to_string()))?;

            if !dlog::verify::<C>(&mut self.dealer_transcript(*dealer_id), &feldman[0], &message.proof) {
                return Err(Error::abort(dealer, "invalid proof of the dealt secret"));
            }

            let received = self
                .received_shares
                .get(dealer)
                .ok_or_else(|| Error::Missing(format!("share from {dealer}")))?;
            if Point::<C>::generator() * received != evaluate_commitment::<C>(feldman, self.my_id) {
                return Err(Error::abort(dealer, "share does not match Feldman vector"));
            }

            share += received;
            for (sum, point) in combined.iter_mut().zip(feldman) {
                *sum += point;
            }
        }
        for received in self.received_shares.values_mut() {
            received.zeroize();
        }
        self.received_shares.clear();

        let public_key = combined[0];
        if bool::from(public_key.is_identity()) {
            return Err(Error::TotalAbort("joint public key is the identity".into()));
        }
        let shares: BTreeMap<SharingId, Point<C>> = self
            .sharing
            .iter()
            .map(|(id, _)| (id, evaluate_commitment::<C>(&combined, id)))
            .collect();
        if shares.get(&self.my_id) != Some(&(Point::<C>::generator() * share)) {
            return Err(Error::Failed("own share does not match joint commitments".into()));
        }

        self.round = 4;
        info!(
            public_key = %hex::encode(C::point_to_bytes(&public_key)),
            "VSS complete"
        );
        let signing_key_share = SigningKeyShare { share, public_key };
        share.zeroize();
        Ok((
            signing_key_share,
            PublicKeyShares {
                public_key,
                feldman_commitments: combined,
                shares,
            },
        ))
    }
}

impl<C: EcdsaCurve> Drop for Participant<C> {
    fn drop(&mut self) {
        for share in self.received_shares.values_mut() {
            share.zeroize();
        }
    }
}
