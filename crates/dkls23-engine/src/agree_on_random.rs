//! AgreeOnRandom: two rounds to derive a shared session id.
//!
//! Every participant broadcasts a random scalar; the session id is extracted
//! from a transcript that absorbs all contributions in sharing-id order.

use std::collections::BTreeSet;
use std::marker::PhantomData;

use elliptic_curve::ff::Field;
use merlin::Transcript;
use rand_core::CryptoRngCore;
use tracing::{debug, info, instrument};

use crate::curve::{EcdsaCurve, Scalar};
use crate::messages::{expect_round, RoundMessages, Validate};
use crate::participants::SharingConfig;
use crate::transcript::TranscriptProtocol;
use crate::types::{IdentityKey, SessionId};
use crate::{Error, Result};

const TRANSCRIPT_LABEL: &[u8] = b"dkls23 agree on random";
const CONTRIBUTION_LABEL: &[u8] = b"agree on random contribution";
const SESSION_ID_LABEL: &[u8] = b"agree on random session id";

/// Round 1 broadcast: a fresh random scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round1Broadcast<C: EcdsaCurve> {
    pub r_i: Scalar<C>,
}

impl<C: EcdsaCurve> Validate for Round1Broadcast<C> {
    fn validate(&self) -> Result<()> {
        if bool::from(self.r_i.is_zero()) {
            return Err(Error::InvalidArgument("zero contribution".into()));
        }
        Ok(())
    }
}

/// AgreeOnRandom participant
pub struct Participant<C: EcdsaCurve> {
    my_identity: IdentityKey,
    sharing: SharingConfig,
    transcript: Transcript,
    contribution: Option<Scalar<C>>,
    round: u32,
    _curve: PhantomData<C>,
}

impl<C: EcdsaCurve> Participant<C> {
    pub fn new(
        my_identity: IdentityKey,
        participants: &BTreeSet<IdentityKey>,
        transcript: Option<Transcript>,
    ) -> Result<Self> {
        if participants.len() < 2 {
            return Err(Error::InvalidArgument(
                "at least two participants are required".into(),
            ));
        }
        if !participants.contains(&my_identity) {
            return Err(Error::InvalidArgument(format!(
                "{my_identity} is not a participant"
            )));
        }

        let mut transcript = transcript.unwrap_or_else(|| Transcript::new(TRANSCRIPT_LABEL));
        transcript.append_message(b"curve", C::NAME.as_bytes());

        Ok(Self {
            my_identity,
            sharing: SharingConfig::new(participants),
            transcript,
            contribution: None,
            round: 1,
            _curve: PhantomData,
        })
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.my_identity
    }

    #[instrument(skip_all, fields(identity = %self.my_identity))]
    pub fn round1(&mut self, rng: &mut impl CryptoRngCore) -> Result<Round1Broadcast<C>> {
        expect_round(self.round, 1)?;

        let r_i = Scalar::<C>::random(&mut *rng);
        self.contribution = Some(r_i);
        self.round = 2;
        debug!("AgreeOnRandom round 1 done");
        Ok(Round1Broadcast { r_i })
    }

    /// `contributions` must hold every participant's round 1 broadcast, including our own.
    #[instrument(skip_all, fields(identity = %self.my_identity))]
    pub fn round2(
        &mut self,
        contributions: &RoundMessages<Round1Broadcast<C>>,
    ) -> Result<SessionId> {
        expect_round(self.round, 2)?;
        contributions.validate_from(self.sharing.iter().map(|(_, identity)| identity))?;
        let own = self
            .contribution
            .ok_or_else(|| Error::Missing("own contribution".into()))?;
        if contributions.get(&self.my_identity)?.r_i != own {
            return Err(Error::InvalidArgument(
                "own contribution does not match round 1".into(),
            ));
        }

        for (id, identity) in self.sharing.iter() {
            let contribution = contributions
                .get(identity)
                .map_err(|_| Error::Missing(format!("no contribution for sharing id {id}")))?;
            self.transcript
                .append_scalar::<C>(CONTRIBUTION_LABEL, &contribution.r_i);
        }

        let session_id: SessionId = self.transcript.extract_bytes(SESSION_ID_LABEL);
        self.round = 3;

        info!(
            session_id = hex::encode(session_id),
            participants = self.sharing.len(),
            "Agreed on session id"
        );
        Ok(session_id)
    }
}
