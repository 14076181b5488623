//! Two-party multiplication over random OT extension.
//!
//! Bob holds `chi`, Alice holds `a = [a_0, .., a_{L-1}]`. After three
//! messages Alice outputs `c` and Bob outputs `d` with `c_l + d_l = a_l * chi`.
//! Bob acts as the OT-extension receiver on top of his base-OT *sender*
//! output; Alice is the extension sender on top of her base-OT *receiver*
//! output, whose choice bits form the correlation `delta`.

use std::marker::PhantomData;

use elliptic_curve::ff::Field;
use merlin::Transcript;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use tracing::{debug, instrument};
use zeroize::Zeroize;

#[cfg(feature = "multi-thread")]
use rayon::prelude::*;

use crate::curve::{EcdsaCurve, Scalar};
use crate::messages::{expect_round, Validate};
use crate::oblivious::extension::{
    bit, challenges_from_bytes, clmul, expand_seed, transpose, xor_into, Column, COLUMN_BYTES,
    GADGET_ROWS, KAPPA, OTE_ROWS,
};
use crate::oblivious::{ReceiverRotOutput, SenderRotOutput};
use crate::transcript::TranscriptProtocol;
use crate::types::{IdentityKey, SessionId, SharingId};
use crate::{Error, Result};

const PAIR_LABEL: &[u8] = b"mult pair";
const SESSION_LABEL: &[u8] = b"mult session";
const GADGET_LABEL: &[u8] = b"mult gadget";
const COLUMNS_LABEL: &[u8] = b"mult correction column";
const CHALLENGE_LABEL: &[u8] = b"mult consistency challenge";
const PAD_CONTEXT: &str = "dkls23-engine mult row pad";

/// Bob's message: IKNP correction columns and the KOS check values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round1Output {
    pub columns: Vec<Vec<u8>>,
    pub check_x: u128,
    pub check_t: (u128, u128),
}

/// Alice's message: one correction per gadget row and input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round2Output<C: EcdsaCurve, const L: usize> {
    pub tau: Vec<[Scalar<C>; L]>,
}

impl Validate for Round1Output {
    fn validate(&self) -> Result<()> {
        if self.columns.len() != KAPPA {
            return Err(Error::InvalidArgument(format!(
                "expected {KAPPA} columns, got {}",
                self.columns.len()
            )));
        }
        if self.columns.iter().any(|column| column.len() != COLUMN_BYTES) {
            return Err(Error::InvalidArgument("malformed correction column".into()));
        }
        Ok(())
    }
}

impl<C: EcdsaCurve, const L: usize> Validate for Round2Output<C, L> {
    fn validate(&self) -> Result<()> {
        if self.tau.len() != GADGET_ROWS {
            return Err(Error::InvalidArgument(format!(
                "expected {GADGET_ROWS} corrections, got {}",
                self.tau.len()
            )));
        }
        Ok(())
    }
}

/// Transcript of one (Alice, Bob) instance, forked from the caller's.
pub fn pair_transcript(base: &Transcript, alice: SharingId, bob: SharingId) -> Transcript {
    let mut transcript = base.clone();
    transcript.append_messages(PAIR_LABEL, &[&alice.to_be_bytes(), &bob.to_be_bytes()]);
    transcript
}

/// Session nonce for the PRG and the gadget vector: `2^i` for the first
/// 256 rows, transcript challenges for the rest.
fn setup<C: EcdsaCurve>(transcript: &mut Transcript) -> (SessionId, Vec<Scalar<C>>) {
    let session = transcript.extract_bytes(SESSION_LABEL);
    let mut gadget = Vec::with_capacity(GADGET_ROWS);
    let mut power = Scalar::<C>::ONE;
    for _ in 0..256 {
        gadget.push(power);
        power = power.double();
    }
    for _ in 256..GADGET_ROWS {
        gadget.push(transcript.challenge_scalar::<C>(GADGET_LABEL));
    }
    (session, gadget)
}

fn row_challenges(transcript: &mut Transcript, columns: &[Vec<u8>]) -> Vec<u128> {
    for column in columns {
        transcript.append_message(COLUMNS_LABEL, column);
    }
    let mut bytes = vec![0u8; OTE_ROWS * 16];
    transcript.challenge_bytes(CHALLENGE_LABEL, &mut bytes);
    challenges_from_bytes(&bytes)
}

fn row_pad<C: EcdsaCurve, const L: usize>(session: &SessionId, index: usize, row: u128) -> [Scalar<C>; L] {
    let mut hasher = blake3::Hasher::new_derive_key(PAD_CONTEXT);
    hasher
        .update(session)
        .update(&(index as u32).to_be_bytes())
        .update(&row.to_le_bytes());
    let mut reader = hasher.finalize_xof();
    std::array::from_fn(|_| {
        let mut wide = [0u8; 64];
        reader.fill(&mut wide);
        C::reduce_wide(&wide)
    })
}

/// Hash the gadget rows into `L` scalars each.
fn row_pads<C: EcdsaCurve, const L: usize>(session: &SessionId, rows: &[u128]) -> Vec<[Scalar<C>; L]> {
    #[cfg(feature = "multi-thread")]
    let iter = rows[..GADGET_ROWS].par_iter();
    #[cfg(not(feature = "multi-thread"))]
    let iter = rows[..GADGET_ROWS].iter();

    iter.enumerate()
        .map(|(i, row)| row_pad::<C, L>(session, i, *row))
        .collect()
}

/// Multiplication receiver: holds `chi`.
pub struct Bob<C: EcdsaCurve, const L: usize> {
    counterparty: IdentityKey,
    transcript: Transcript,
    base_ot: SenderRotOutput,
    round: u32,
    session: SessionId,
    gadget: Vec<Scalar<C>>,
    choices: Column,
    rows: Vec<u128>,
}

impl<C: EcdsaCurve, const L: usize> Bob<C, L> {
    pub fn new(counterparty: IdentityKey, transcript: Transcript, base_ot: &SenderRotOutput) -> Result<Self> {
        base_ot.validate()?;
        Ok(Self {
            counterparty,
            transcript,
            base_ot: base_ot.clone(),
            round: 1,
            session: [0u8; 32],
            gadget: Vec::new(),
            choices: [0u8; COLUMN_BYTES],
            rows: Vec::new(),
        })
    }

    /// Sample Bob's input and extend the base OTs. Returns `chi`.
    #[instrument(skip_all, fields(counterparty = %self.counterparty))]
    pub fn round1(&mut self, rng: &mut impl CryptoRngCore) -> Result<(Scalar<C>, Round1Output)> {
        expect_round(self.round, 1)?;
        let (session, gadget) = setup::<C>(&mut self.transcript);
        rng.fill_bytes(&mut self.choices);

        let mut chi = Scalar::<C>::ZERO;
        for (i, g) in gadget.iter().enumerate() {
            chi += Scalar::<C>::conditional_select(
                &Scalar::<C>::ZERO,
                g,
                Choice::from(bit(&self.choices, i)),
            );
        }

        let mut columns = Vec::with_capacity(KAPPA);
        let mut t_columns = Vec::with_capacity(KAPPA);
        for (j, (k0, k1)) in self.base_ot.message_pairs.iter().enumerate() {
            let t = expand_seed(&session, j, k0);
            let mut u = expand_seed(&session, j, k1);
            xor_into(&mut u, &t);
            xor_into(&mut u, &self.choices);
            columns.push(u.to_vec());
            t_columns.push(t);
        }
        let rows = transpose(&t_columns);
        t_columns.zeroize();

        let challenges = row_challenges(&mut self.transcript, &columns);
        let mut check_x = 0u128;
        let mut check_t = (0u128, 0u128);
        for (i, (challenge, row)) in challenges.iter().zip(&rows).enumerate() {
            check_x ^= challenge & 0u128.wrapping_sub(u128::from(bit(&self.choices, i)));
            let (high, low) = clmul(*challenge, *row);
            check_t.0 ^= high;
            check_t.1 ^= low;
        }

        self.session = session;
        self.gadget = gadget;
        self.rows = rows;
        self.round = 3;
        debug!("multiplication round 1 done");
        Ok((
            chi,
            Round1Output {
                columns,
                check_x,
                check_t,
            },
        ))
    }

    /// Bob's output share `d`.
    #[instrument(skip_all, fields(counterparty = %self.counterparty))]
    pub fn round3(&mut self, input: &Round2Output<C, L>) -> Result<[Scalar<C>; L]> {
        expect_round(self.round, 3)?;
        input
            .validate()
            .map_err(|e| Error::abort(&self.counterparty, e.to_string()))?;

        let pads = row_pads::<C, L>(&self.session, &self.rows);
        let mut d = [Scalar::<C>::ZERO; L];
        for (i, (pad, tau)) in pads.iter().zip(&input.tau).enumerate() {
            let choice = Choice::from(bit(&self.choices, i));
            for l in 0..L {
                let correction = Scalar::<C>::conditional_select(&Scalar::<C>::ZERO, &tau[l], choice);
                d[l] += self.gadget[i] * (pad[l] + correction);
            }
        }
        self.round = 4;
        Ok(d)
    }
}

impl<C: EcdsaCurve, const L: usize> Drop for Bob<C, L> {
    fn drop(&mut self) {
        self.choices.zeroize();
        self.rows.zeroize();
    }
}

/// Multiplication sender: holds `a`.
pub struct Alice<C: EcdsaCurve, const L: usize> {
    counterparty: IdentityKey,
    transcript: Transcript,
    base_ot: ReceiverRotOutput,
    round: u32,
    _curve: PhantomData<C>,
}

impl<C: EcdsaCurve, const L: usize> Alice<C, L> {
    pub fn new(
        counterparty: IdentityKey,
        transcript: Transcript,
        base_ot: &ReceiverRotOutput,
    ) -> Result<Self> {
        base_ot.validate()?;
        Ok(Self {
            counterparty,
            transcript,
            base_ot: base_ot.clone(),
            round: 2,
            _curve: PhantomData,
        })
    }

    /// Check Bob's extension and mask `a`. Returns Alice's share `c`.
    #[instrument(skip_all, fields(counterparty = %self.counterparty))]
    pub fn round2(
        &mut self,
        input: &Round1Output,
        a: &[Scalar<C>; L],
    ) -> Result<([Scalar<C>; L], Round2Output<C, L>)> {
        expect_round(self.round, 2)?;
        input
            .validate()
            .map_err(|e| Error::abort(&self.counterparty, e.to_string()))?;

        let (session, gadget) = setup::<C>(&mut self.transcript);
        let delta = self.base_ot.choices;

        let mut q_columns = Vec::with_capacity(KAPPA);
        for (j, (seed, column)) in self
            .base_ot
            .chosen_messages
            .iter()
            .zip(&input.columns)
            .enumerate()
        {
            let mut q = expand_seed(&session, j, seed);
            let mask = 0u8.wrapping_sub(((delta >> j) & 1) as u8);
            for (q_byte, u_byte) in q.iter_mut().zip(column) {
                *q_byte ^= u_byte & mask;
            }
            q_columns.push(q);
        }
        let rows = transpose(&q_columns);
        q_columns.zeroize();

        let challenges = row_challenges(&mut self.transcript, &input.columns);
        let mut check = (0u128, 0u128);
        for (challenge, row) in challenges.iter().zip(&rows) {
            let (high, low) = clmul(*challenge, *row);
            check.0 ^= high;
            check.1 ^= low;
        }
        let (high, low) = clmul(input.check_x, delta);
        let expected = (input.check_t.0 ^ high, input.check_t.1 ^ low);
        if !bool::from(check.0.ct_eq(&expected.0) & check.1.ct_eq(&expected.1)) {
            return Err(Error::abort(
                &self.counterparty,
                "OT extension consistency check failed",
            ));
        }

        let flipped: Vec<u128> = rows.iter().map(|row| row ^ delta).collect();
        let p0 = row_pads::<C, L>(&session, &rows);
        let p1 = row_pads::<C, L>(&session, &flipped);

        let mut c = [Scalar::<C>::ZERO; L];
        let mut tau = Vec::with_capacity(GADGET_ROWS);
        for i in 0..GADGET_ROWS {
            let mut correction = [Scalar::<C>::ZERO; L];
            for l in 0..L {
                correction[l] = p0[i][l] - p1[i][l] + a[l];
                c[l] -= gadget[i] * p0[i][l];
            }
            tau.push(correction);
        }
        self.round = 3;
        debug!("multiplication round 2 done");
        Ok((c, Round2Output { tau }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oblivious::vsot::run_vsot;
    use crate::types::AuthKey;
    use k256::Secp256k1;
    use rand::rngs::OsRng;

    fn instance<C: EcdsaCurve>(tweak_bob: bool) -> (Alice<C, 2>, Bob<C, 2>, IdentityKey, IdentityKey) {
        let alice_id = AuthKey::random(&mut OsRng).identity_key();
        let bob_id = AuthKey::random(&mut OsRng).identity_key();
        // Bob is the base OT sender
        let (sender, receiver) = run_vsot::<C>(&bob_id, &alice_id, &[1u8; 32]).unwrap();

        let base = Transcript::new(b"mult test");
        let alice = Alice::new(bob_id, pair_transcript(&base, 1, 2), &receiver).unwrap();
        let bob_transcript = pair_transcript(&base, 1, if tweak_bob { 3 } else { 2 });
        let bob = Bob::new(alice_id, bob_transcript, &sender).unwrap();
        (alice, bob, alice_id, bob_id)
    }

    fn check_product<C: EcdsaCurve>() {
        let (mut alice, mut bob, _, _) = instance::<C>(false);
        let a = [Scalar::<C>::random(&mut OsRng), Scalar::<C>::random(&mut OsRng)];

        let (chi, m1) = bob.round1(&mut OsRng).unwrap();
        let (c, m2) = alice.round2(&m1, &a).unwrap();
        let d = bob.round3(&m2).unwrap();

        for l in 0..2 {
            assert_eq!(c[l] + d[l], a[l] * chi);
        }
    }

    #[test]
    fn test_product_secp256k1() {
        check_product::<Secp256k1>();
    }

    #[test]
    fn test_product_p256() {
        check_product::<p256::NistP256>();
    }

    #[test]
    fn test_tampered_check_blames_bob() {
        let (mut alice, mut bob, _, bob_id) = instance::<Secp256k1>(false);
        let a = [k256::Scalar::ONE, k256::Scalar::ONE];

        let (_, mut m1) = bob.round1(&mut OsRng).unwrap();
        m1.check_x ^= 1;
        let err = alice.round2(&m1, &a).unwrap_err();
        assert_eq!(err.culprit(), Some(&bob_id));
    }

    #[test]
    fn test_tampered_column_blames_bob() {
        let (mut alice, mut bob, _, bob_id) = instance::<Secp256k1>(false);
        let a = [k256::Scalar::ONE, k256::Scalar::ONE];

        let (_, mut m1) = bob.round1(&mut OsRng).unwrap();
        m1.columns[5][0] ^= 0x10;
        let err = alice.round2(&m1, &a).unwrap_err();
        assert_eq!(err.culprit(), Some(&bob_id));
    }

    #[test]
    fn test_pair_binding() {
        let (mut alice, mut bob, _, _) = instance::<Secp256k1>(true);
        let a = [k256::Scalar::ONE, k256::Scalar::ONE];

        let (_, m1) = bob.round1(&mut OsRng).unwrap();
        assert!(alice.round2(&m1, &a).is_err());
    }

    #[test]
    fn test_malformed_message() {
        let (_, mut bob, alice_id, _) = instance::<Secp256k1>(false);
        bob.round1(&mut OsRng).unwrap();
        let err = bob.round3(&Round2Output { tau: vec![] }).unwrap_err();
        assert_eq!(err.culprit(), Some(&alice_id));
        assert!(bob.round1(&mut OsRng).is_err());
    }
}
