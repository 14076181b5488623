//! Interactive cosigner

use std::collections::{BTreeMap, BTreeSet};

use elliptic_curve::{ff::Field, group::Group};
use merlin::Transcript;
use rand_core::CryptoRngCore;
use tracing::{debug, info, instrument};
use zeroize::Zeroize;

use super::messages::*;
use super::noninteractive::{produce_partial_signature, PreProcessingMaterial, PrivateMaterial};
use super::PartialSignature;
use crate::commitments::{self, Commitment, Witness};
use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::keygen::Shard;
use crate::messages::{RoundMessages, Validate};
use crate::mult::{self, Alice, Bob};
use crate::participants::SharingConfig;
use crate::transcript::TranscriptProtocol;
use crate::types::{AuthKey, IdentityKey, SessionId, SharingId};
use crate::zero::Sampler;
use crate::{Error, Result};

const TRANSCRIPT_LABEL: &[u8] = b"dkls23 sign";

/// Secrets sampled in round 1.
struct Nonces<C: EcdsaCurve> {
    r: Scalar<C>,
    phi: Scalar<C>,
    chi: BTreeMap<IdentityKey, Scalar<C>>,
}

impl<C: EcdsaCurve> Drop for Nonces<C> {
    fn drop(&mut self) {
        self.r.zeroize();
        self.phi.zeroize();
        for chi in self.chi.values_mut() {
            chi.zeroize();
        }
    }
}

enum State<C: EcdsaCurve> {
    Round1,
    Round2 {
        nonces: Nonces<C>,
        witnesses: BTreeMap<IdentityKey, Witness>,
    },
    Round3 {
        nonces: Nonces<C>,
        zeta: Scalar<C>,
        public_share: Point<C>,
        commitments: BTreeMap<IdentityKey, Commitment>,
        cu: BTreeMap<IdentityKey, Scalar<C>>,
        cv: BTreeMap<IdentityKey, Scalar<C>>,
    },
    Done,
}

impl<C: EcdsaCurve> State<C> {
    fn round(&self) -> u32 {
        match self {
            State::Round1 => 1,
            State::Round2 { .. } => 2,
            State::Round3 { .. } => 3,
            State::Done => 4,
        }
    }
}

/// One signer of a quorum.
///
/// Round 1 and 2 need no message; round 3 takes the message and returns
/// this cosigner's [`PartialSignature`].
pub struct Cosigner<C: EcdsaCurve> {
    my_identity: IdentityKey,
    my_id: SharingId,
    shard: Shard<C>,
    quorum: BTreeSet<IdentityKey>,
    sharing: SharingConfig,
    session_id: SessionId,
    alices: BTreeMap<IdentityKey, Alice<C, 2>>,
    bobs: BTreeMap<IdentityKey, Bob<C, 2>>,
    state: State<C>,
}

impl<C: EcdsaCurve> Cosigner<C> {
    pub fn new(
        session_id: &SessionId,
        auth_key: &AuthKey,
        shard: &Shard<C>,
        quorum: &BTreeSet<IdentityKey>,
    ) -> Result<Self> {
        if *session_id == [0u8; 32] {
            return Err(Error::InvalidArgument("empty session id".into()));
        }
        let my_identity = auth_key.identity_key();
        if my_identity != *shard.identity_key() {
            return Err(Error::InvalidArgument(
                "auth key does not belong to the shard".into(),
            ));
        }
        if !quorum.contains(&my_identity) {
            return Err(Error::InvalidArgument(format!(
                "{my_identity} is not in the quorum"
            )));
        }
        shard.cohort().validate_quorum(quorum)?;
        shard.validate()?;

        let sharing = shard.cohort().sharing_config();
        let my_id = sharing.sharing_id(&my_identity)?;

        let mut transcript = Transcript::new(TRANSCRIPT_LABEL);
        transcript.append_message(b"curve", C::NAME.as_bytes());
        for identity in quorum {
            transcript.append_message(b"quorum member", &identity.to_bytes());
        }
        let bound = transcript.bind(session_id, b"sign");

        let mut alices = BTreeMap::new();
        let mut bobs = BTreeMap::new();
        for other in quorum.iter().filter(|identity| **identity != my_identity) {
            let other_id = sharing.sharing_id(other)?;
            let base_ots = shard.base_ots(other)?;
            alices.insert(
                *other,
                Alice::new(
                    *other,
                    mult::pair_transcript(&transcript, my_id, other_id),
                    &base_ots.as_receiver,
                )?,
            );
            bobs.insert(
                *other,
                Bob::new(
                    *other,
                    mult::pair_transcript(&transcript, other_id, my_id),
                    &base_ots.as_sender,
                )?,
            );
        }

        info!(sharing_id = my_id, signers = quorum.len(), "Starting signing");
        Ok(Self {
            my_identity,
            my_id,
            shard: shard.clone(),
            quorum: quorum.clone(),
            sharing,
            session_id: bound,
            alices,
            bobs,
            state: State::Round1,
        })
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.my_identity
    }

    pub fn shard(&self) -> &Shard<C> {
        &self.shard
    }

    fn others(&self) -> Vec<IdentityKey> {
        self.bobs.keys().copied().collect()
    }

    fn quorum_ids(&self) -> Result<Vec<SharingId>> {
        self.quorum
            .iter()
            .map(|identity| self.sharing.sharing_id(identity))
            .collect()
    }

    fn expect(&self, expected: u32) -> Result<()> {
        crate::messages::expect_round(self.state.round(), expected)
    }

    /// Sample the nonce share and the multiplicative mask, commit to `R_i`
    /// and start the multiplications as Bob.
    #[instrument(skip_all, fields(sharing_id = self.my_id, round = 1))]
    pub fn round1(&mut self, rng: &mut impl CryptoRngCore) -> Result<RoundMessages<Round1P2P>> {
        self.expect(1)?;
        let r = Scalar::<C>::random(&mut *rng);
        let phi = Scalar::<C>::random(&mut *rng);
        let big_r = Point::<C>::generator() * r;
        let big_r_bytes = C::point_to_bytes(&big_r);
        let my_bytes = self.my_identity.to_bytes();

        let mut chi = BTreeMap::new();
        let mut witnesses = BTreeMap::new();
        let mut output = RoundMessages::new();
        for (other, bob) in self.bobs.iter_mut() {
            let (commitment, witness) = commitments::commit(
                &self.session_id,
                rng,
                &[&my_bytes, &other.to_bytes(), &big_r_bytes],
            );
            let (chi_j, mult) = bob.round1(rng)?;
            chi.insert(*other, chi_j);
            witnesses.insert(*other, witness);
            output.insert(*other, Round1P2P { commitment, mult });
        }

        self.state = State::Round2 {
            nonces: Nonces { r, phi, chi },
            witnesses,
        };
        debug!("signing round 1 complete");
        Ok(output)
    }

    /// Re-randomize the key share with PRZS and answer every Bob as Alice.
    #[instrument(skip_all, fields(sharing_id = self.my_id, round = 2))]
    pub fn round2(
        &mut self,
        p2p: &RoundMessages<Round1P2P>,
    ) -> Result<(Round2Broadcast<C>, RoundMessages<Round2P2P<C>>)> {
        self.expect(2)?;
        p2p.validate_from(&self.others())?;

        let sampler = Sampler::<C>::new(
            self.my_identity,
            &self.session_id,
            self.shard.pairwise_seeds(),
            &self.quorum,
        )?;
        let zeta = sampler.sample()?;
        let mut sk = self
            .shard
            .signing_key_share()
            .additive_share(self.my_id, &self.quorum_ids()?)?
            + zeta;
        let public_share = Point::<C>::generator() * sk;

        let (nonces, mut witnesses) = match std::mem::replace(&mut self.state, State::Done) {
            State::Round2 { nonces, witnesses } => (nonces, witnesses),
            _ => return Err(Error::Failed("signing state lost".into())),
        };

        let mut commitments = BTreeMap::new();
        let mut cu = BTreeMap::new();
        let mut cv = BTreeMap::new();
        let mut output = RoundMessages::new();
        for (other, alice) in self.alices.iter_mut() {
            let message = p2p.get(other)?;
            let (c, mult) = alice.round2(&message.mult, &[nonces.r, sk])?;
            let chi = nonces
                .chi
                .get(other)
                .ok_or_else(|| Error::Missing(format!("chi for {other}")))?;
            let witness = witnesses
                .remove(other)
                .ok_or_else(|| Error::Missing(format!("witness for {other}")))?;
            output.insert(
                *other,
                Round2P2P {
                    mult,
                    gamma_u: Point::<C>::generator() * c[0],
                    gamma_v: Point::<C>::generator() * c[1],
                    psi: nonces.phi - chi,
                    witness,
                },
            );
            commitments.insert(*other, message.commitment);
            cu.insert(*other, c[0]);
            cv.insert(*other, c[1]);
        }
        sk.zeroize();

        let broadcast = Round2Broadcast {
            big_r: Point::<C>::generator() * nonces.r,
            public_share,
        };
        self.state = State::Round3 {
            nonces,
            zeta,
            public_share,
            commitments,
            cu,
            cv,
        };
        debug!("signing round 2 complete");
        Ok((broadcast, output))
    }

    /// Verify every counterparty and collect the pre-signature.
    ///
    /// Shared by interactive round 3 and [`super::PreSigner`].
    pub(crate) fn presign(
        &mut self,
        broadcasts: &RoundMessages<Round2Broadcast<C>>,
        p2p: &RoundMessages<Round2P2P<C>>,
    ) -> Result<PreProcessingMaterial<C>> {
        self.expect(3)?;
        let others = self.others();
        broadcasts.validate_from(&others)?;
        p2p.validate_from(&others)?;

        let (nonces, zeta, public_share, commitments, cu, cv) =
            match std::mem::replace(&mut self.state, State::Done) {
                State::Round3 {
                    nonces,
                    zeta,
                    public_share,
                    commitments,
                    cu,
                    cv,
                } => (nonces, zeta, public_share, commitments, cu, cv),
                _ => return Err(Error::Failed("signing state lost".into())),
            };

        let my_bytes = self.my_identity.to_bytes();
        let mut public_key = public_share;
        let mut pre_signature = BTreeMap::new();
        let mut du = BTreeMap::new();
        let mut dv = BTreeMap::new();
        let mut psi = BTreeMap::new();
        pre_signature.insert(self.my_identity, Point::<C>::generator() * nonces.r);

        for (other, bob) in self.bobs.iter_mut() {
            let broadcast = broadcasts.get(other)?;
            let message = p2p.get(other)?;
            let commitment = commitments
                .get(other)
                .ok_or_else(|| Error::Missing(format!("commitment from {other}")))?;
            commitments::open(
                &self.session_id,
                commitment,
                &message.witness,
                &[&other.to_bytes(), &my_bytes, &C::point_to_bytes(&broadcast.big_r)],
            )
            .map_err(|e| Error::abort(other, format!("nonce commitment: {e}")))?;

            let d = bob.round3(&message.mult)?;
            let chi = nonces
                .chi
                .get(other)
                .ok_or_else(|| Error::Missing(format!("chi for {other}")))?;
            let generator = Point::<C>::generator();
            if broadcast.big_r * chi - message.gamma_u != generator * d[0] {
                return Err(Error::abort(other, "nonce cross-term check failed"));
            }
            if broadcast.public_share * chi - message.gamma_v != generator * d[1] {
                return Err(Error::abort(other, "key cross-term check failed"));
            }

            public_key += broadcast.public_share;
            pre_signature.insert(*other, broadcast.big_r);
            du.insert(*other, d[0]);
            dv.insert(*other, d[1]);
            psi.insert(*other, message.psi);
        }

        if public_key != *self.shard.public_key() {
            return Err(Error::TotalAbort(
                "public shares do not sum to the public key".into(),
            ));
        }
        if bool::from(pre_signature.values().copied().sum::<Point<C>>().is_identity()) {
            return Err(Error::TotalAbort("nonce points sum to the identity".into()));
        }

        debug!("pre-signature complete");
        Ok(PreProcessingMaterial::new(
            self.quorum.clone(),
            self.my_identity,
            PrivateMaterial {
                r: nonces.r,
                phi: nonces.phi,
                zeta,
                cu,
                cv,
                du,
                dv,
                psi,
            },
            pre_signature,
        ))
    }

    /// Finish the protocol and sign `message`.
    #[instrument(skip_all, fields(sharing_id = self.my_id, round = 3))]
    pub fn round3(
        &mut self,
        broadcasts: &RoundMessages<Round2Broadcast<C>>,
        p2p: &RoundMessages<Round2P2P<C>>,
        message: &[u8],
    ) -> Result<PartialSignature<C>> {
        let material = self.presign(broadcasts, p2p)?;
        let partial = produce_partial_signature(material, &self.shard, message)?;
        partial.validate()?;
        info!(sharing_id = self.my_id, "partial signature produced");
        Ok(partial)
    }
}
