//! Verified simplest OT.
//!
//! A batch of [`BASE_OT_BATCH`] random OTs from a single Diffie-Hellman
//! style exchange, followed by a challenge/response that lets each side
//! verify the other. The sender ends with two pads per instance, the
//! receiver with one pad per instance and its random choice bits.

use elliptic_curve::{ff::Field, group::Group};
use merlin::Transcript;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use tracing::{debug, instrument};
use zeroize::Zeroize;

use super::{ReceiverRotOutput, SenderRotOutput, BASE_OT_BATCH};
use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::messages::{expect_round, Validate};
use crate::proofs::dlog;
use crate::transcript::TranscriptProtocol;
use crate::types::{IdentityKey, SessionId};
use crate::{Error, Result};

const TRANSCRIPT_LABEL: &[u8] = b"dkls23 vsot";
const PAD_CONTEXT: &str = "dkls23-engine vsot pad";
const HASH_CONTEXT: &str = "dkls23-engine vsot hash";

/// Sender round 1: the sender's public key and a proof of its secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round1Output<C: EcdsaCurve> {
    pub public_key: Point<C>,
    pub proof: dlog::Proof<C>,
}

/// Receiver round 2: one blinded choice per instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round2Output<C: EcdsaCurve> {
    pub blinded_choices: Vec<Point<C>>,
}

/// Sender round 3: challenges `H(H(p0)) ^ H(H(p1))`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round3Output {
    pub challenges: Vec<[u8; 32]>,
}

/// Receiver round 4: responses `H(H(p_w)) ^ w * challenge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round4Output {
    pub responses: Vec<[u8; 32]>,
}

/// Sender round 5: `(H(p0), H(p1))` so the receiver can check the challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round5Output {
    pub openings: Vec<([u8; 32], [u8; 32])>,
}

fn check_batch(len: usize, what: &str) -> Result<()> {
    if len != BASE_OT_BATCH {
        return Err(Error::InvalidArgument(format!(
            "expected {BASE_OT_BATCH} {what}, got {len}"
        )));
    }
    Ok(())
}

impl<C: EcdsaCurve> Validate for Round1Output<C> {
    fn validate(&self) -> Result<()> {
        if bool::from(self.public_key.is_identity()) {
            return Err(Error::InvalidArgument("identity OT public key".into()));
        }
        Ok(())
    }
}

impl<C: EcdsaCurve> Validate for Round2Output<C> {
    fn validate(&self) -> Result<()> {
        check_batch(self.blinded_choices.len(), "blinded choices")?;
        if self
            .blinded_choices
            .iter()
            .any(|point| bool::from(point.is_identity()))
        {
            return Err(Error::InvalidArgument("identity blinded choice".into()));
        }
        Ok(())
    }
}

impl Validate for Round3Output {
    fn validate(&self) -> Result<()> {
        check_batch(self.challenges.len(), "challenges")
    }
}

impl Validate for Round4Output {
    fn validate(&self) -> Result<()> {
        check_batch(self.responses.len(), "responses")
    }
}

impl Validate for Round5Output {
    fn validate(&self) -> Result<()> {
        check_batch(self.openings.len(), "openings")
    }
}

fn pad<C: EcdsaCurve>(session: &SessionId, index: usize, point: &Point<C>) -> [u8; 32] {
    *blake3::Hasher::new_derive_key(PAD_CONTEXT)
        .update(session)
        .update(&(index as u32).to_be_bytes())
        .update(&C::point_to_bytes(point))
        .finalize()
        .as_bytes()
}

fn hash(session: &SessionId, input: &[u8; 32]) -> [u8; 32] {
    *blake3::Hasher::new_derive_key(HASH_CONTEXT)
        .update(session)
        .update(input)
        .finalize()
        .as_bytes()
}

fn xor(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = *a;
    for (o, x) in out.iter_mut().zip(b.iter()) {
        *o ^= x;
    }
    out
}

fn select(a: &[u8; 32], b: &[u8; 32], choice: Choice) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (k, o) in out.iter_mut().enumerate() {
        *o = u8::conditional_select(&a[k], &b[k], choice);
    }
    out
}

/// Both ends derive the same transcript for an ordered (sender, receiver) pair.
fn pair_transcript(
    session_id: &SessionId,
    sender: &IdentityKey,
    receiver: &IdentityKey,
) -> (Transcript, SessionId) {
    let mut transcript = Transcript::new(TRANSCRIPT_LABEL);
    transcript.append_messages(b"vsot pair", &[&sender.to_bytes(), &receiver.to_bytes()]);
    let session = transcript.bind(session_id, b"vsot");
    (transcript, session)
}

/// VSOT sender
pub struct Sender<C: EcdsaCurve> {
    counterparty: IdentityKey,
    transcript: Transcript,
    session: SessionId,
    round: u32,
    secret: Scalar<C>,
    public_key: Point<C>,
    pads: Vec<([u8; 32], [u8; 32])>,
    expected_responses: Vec<[u8; 32]>,
}

impl<C: EcdsaCurve> Sender<C> {
    pub fn new(my_identity: &IdentityKey, counterparty: IdentityKey, session_id: &SessionId) -> Self {
        let (transcript, session) = pair_transcript(session_id, my_identity, &counterparty);
        Self {
            counterparty,
            transcript,
            session,
            round: 1,
            secret: Scalar::<C>::ZERO,
            public_key: Point::<C>::identity(),
            pads: Vec::new(),
            expected_responses: Vec::new(),
        }
    }

    pub fn counterparty(&self) -> &IdentityKey {
        &self.counterparty
    }

    #[instrument(skip_all, fields(counterparty = %self.counterparty))]
    pub fn round1(&mut self, rng: &mut impl CryptoRngCore) -> Result<Round1Output<C>> {
        expect_round(self.round, 1)?;
        self.secret = Scalar::<C>::random(&mut *rng);
        self.public_key = Point::<C>::generator() * self.secret;
        let proof = dlog::prove::<C>(
            rng,
            &mut self.transcript.clone(),
            &self.public_key,
            &self.secret,
        );
        self.round = 3;
        Ok(Round1Output {
            public_key: self.public_key,
            proof,
        })
    }

    #[instrument(skip_all, fields(counterparty = %self.counterparty))]
    pub fn round3(&mut self, input: &Round2Output<C>) -> Result<Round3Output> {
        expect_round(self.round, 3)?;
        input
            .validate()
            .map_err(|e| Error::abort(&self.counterparty, e.to_string()))?;

        let mut challenges = Vec::with_capacity(BASE_OT_BATCH);
        for (i, blinded) in input.blinded_choices.iter().enumerate() {
            let p0 = pad::<C>(&self.session, i, &(*blinded * self.secret));
            let p1 = pad::<C>(
                &self.session,
                i,
                &((*blinded - self.public_key) * self.secret),
            );
            let h0 = hash(&self.session, &hash(&self.session, &p0));
            let h1 = hash(&self.session, &hash(&self.session, &p1));
            challenges.push(xor(&h0, &h1));
            self.expected_responses.push(h0);
            self.pads.push((p0, p1));
        }
        self.secret.zeroize();
        self.round = 5;
        Ok(Round3Output { challenges })
    }

    /// Check the responses and open the challenges.
    #[instrument(skip_all, fields(counterparty = %self.counterparty))]
    pub fn round5(&mut self, input: &Round4Output) -> Result<(Round5Output, SenderRotOutput)> {
        expect_round(self.round, 5)?;
        input
            .validate()
            .map_err(|e| Error::abort(&self.counterparty, e.to_string()))?;

        let mut valid = Choice::from(1u8);
        for (response, expected) in input.responses.iter().zip(&self.expected_responses) {
            valid &= response.ct_eq(expected);
        }
        if !bool::from(valid) {
            return Err(Error::abort(&self.counterparty, "VSOT response check failed"));
        }

        let openings = self
            .pads
            .iter()
            .map(|(p0, p1)| (hash(&self.session, p0), hash(&self.session, p1)))
            .collect();
        let output = SenderRotOutput {
            message_pairs: std::mem::take(&mut self.pads),
        };
        self.round = 6;
        debug!("base OT sender done");
        Ok((Round5Output { openings }, output))
    }
}

impl<C: EcdsaCurve> Drop for Sender<C> {
    fn drop(&mut self) {
        self.secret.zeroize();
        for (p0, p1) in self.pads.iter_mut() {
            p0.zeroize();
            p1.zeroize();
        }
    }
}

/// VSOT receiver
pub struct Receiver<C: EcdsaCurve> {
    counterparty: IdentityKey,
    transcript: Transcript,
    session: SessionId,
    round: u32,
    choices: u128,
    pads: Vec<[u8; 32]>,
    challenges: Vec<[u8; 32]>,
    _curve: std::marker::PhantomData<C>,
}

impl<C: EcdsaCurve> Receiver<C> {
    pub fn new(my_identity: &IdentityKey, counterparty: IdentityKey, session_id: &SessionId) -> Self {
        let (transcript, session) = pair_transcript(session_id, &counterparty, my_identity);
        Self {
            counterparty,
            transcript,
            session,
            round: 2,
            choices: 0,
            pads: Vec::new(),
            challenges: Vec::new(),
            _curve: std::marker::PhantomData,
        }
    }

    pub fn counterparty(&self) -> &IdentityKey {
        &self.counterparty
    }

    fn choice(&self, index: usize) -> Choice {
        Choice::from(((self.choices >> index) & 1) as u8)
    }

    #[instrument(skip_all, fields(counterparty = %self.counterparty))]
    pub fn round2(
        &mut self,
        rng: &mut impl CryptoRngCore,
        input: &Round1Output<C>,
    ) -> Result<Round2Output<C>> {
        expect_round(self.round, 2)?;
        input
            .validate()
            .map_err(|e| Error::abort(&self.counterparty, e.to_string()))?;
        if !dlog::verify::<C>(&mut self.transcript.clone(), &input.public_key, &input.proof) {
            return Err(Error::abort(
                &self.counterparty,
                "invalid proof of the OT public key",
            ));
        }

        self.choices = (u128::from(rng.next_u64()) << 64) | u128::from(rng.next_u64());
        let identity = Point::<C>::identity();
        let mut blinded_choices = Vec::with_capacity(BASE_OT_BATCH);
        for i in 0..BASE_OT_BATCH {
            let mut a = Scalar::<C>::random(&mut *rng);
            let offset = Point::<C>::conditional_select(&identity, &input.public_key, self.choice(i));
            blinded_choices.push(Point::<C>::generator() * a + offset);
            self.pads.push(pad::<C>(&self.session, i, &(input.public_key * a)));
            a.zeroize();
        }
        self.round = 4;
        Ok(Round2Output { blinded_choices })
    }

    #[instrument(skip_all, fields(counterparty = %self.counterparty))]
    pub fn round4(&mut self, input: &Round3Output) -> Result<Round4Output> {
        expect_round(self.round, 4)?;
        input
            .validate()
            .map_err(|e| Error::abort(&self.counterparty, e.to_string()))?;

        let zero = [0u8; 32];
        let responses = input
            .challenges
            .iter()
            .zip(&self.pads)
            .enumerate()
            .map(|(i, (challenge, pad))| {
                let masked = select(&zero, challenge, self.choice(i));
                xor(&hash(&self.session, &hash(&self.session, pad)), &masked)
            })
            .collect();
        self.challenges = input.challenges.clone();
        self.round = 6;
        Ok(Round4Output { responses })
    }

    /// Verify the sender's openings and output the chosen pads.
    #[instrument(skip_all, fields(counterparty = %self.counterparty))]
    pub fn round6(&mut self, input: &Round5Output) -> Result<ReceiverRotOutput> {
        expect_round(self.round, 6)?;
        input
            .validate()
            .map_err(|e| Error::abort(&self.counterparty, e.to_string()))?;

        let mut valid = Choice::from(1u8);
        for (i, ((o0, o1), challenge)) in input.openings.iter().zip(&self.challenges).enumerate() {
            let recomputed = xor(&hash(&self.session, o0), &hash(&self.session, o1));
            valid &= recomputed.ct_eq(challenge);
            let opened = select(o0, o1, self.choice(i));
            valid &= opened.ct_eq(&hash(&self.session, &self.pads[i]));
        }
        if !bool::from(valid) {
            return Err(Error::abort(&self.counterparty, "VSOT opening check failed"));
        }

        self.round = 7;
        debug!("base OT receiver done");
        Ok(ReceiverRotOutput {
            choices: self.choices,
            chosen_messages: std::mem::take(&mut self.pads),
        })
    }
}

impl<C: EcdsaCurve> Drop for Receiver<C> {
    fn drop(&mut self) {
        self.choices.zeroize();
        self.pads.zeroize();
    }
}

/// Run a full VSOT between two parties in memory.
#[cfg(test)]
pub(crate) fn run_vsot<C: EcdsaCurve>(
    sender_identity: &IdentityKey,
    receiver_identity: &IdentityKey,
    session_id: &SessionId,
) -> Result<(SenderRotOutput, ReceiverRotOutput)> {
    let mut rng = rand::rngs::OsRng;
    let mut sender = Sender::<C>::new(sender_identity, *receiver_identity, session_id);
    let mut receiver = Receiver::<C>::new(receiver_identity, *sender_identity, session_id);

    let r1 = sender.round1(&mut rng)?;
    let r2 = receiver.round2(&mut rng, &r1)?;
    let r3 = sender.round3(&r2)?;
    let r4 = receiver.round4(&r3)?;
    let (r5, sender_output) = sender.round5(&r4)?;
    let receiver_output = receiver.round6(&r5)?;
    Ok((sender_output, receiver_output))
}
