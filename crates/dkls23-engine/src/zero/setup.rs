//! PRZS setup: commit, open, derive.

use std::collections::{BTreeMap, BTreeSet};

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use tracing::{debug, instrument};
use zeroize::Zeroize;

use super::PairwiseSeeds;
use crate::commitments::{self, Commitment, Witness};
use crate::messages::{expect_round, RoundMessages, Validate};
use crate::participants::SharingConfig;
use crate::types::{IdentityKey, Seed, SessionId};
use crate::{Error, Result};

const CONTRIBUTION_DOMAIN: &[u8] = b"dkls23 przs contribution";
const SEED_DOMAIN: &[u8] = b"dkls23 przs seed";

/// Round 1 P2P: commitment to our seed contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round1P2P {
    pub commitment: Commitment,
}

impl Validate for Round1P2P {
    fn validate(&self) -> Result<()> {
        self.commitment.validate()
    }
}

/// Round 2 P2P: opening of the round 1 commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round2P2P {
    pub contribution: Seed,
    pub witness: Witness,
}

impl Validate for Round2P2P {
    fn validate(&self) -> Result<()> {
        if self.contribution == [0u8; 32] {
            return Err(Error::Missing("empty seed contribution".into()));
        }
        self.witness.validate()
    }
}

struct Contribution {
    seed: Seed,
    witness: Witness,
}

impl Drop for Contribution {
    fn drop(&mut self) {
        self.seed.zeroize();
        self.witness.zeroize();
    }
}

/// PRZS setup participant
pub struct Participant {
    my_identity: IdentityKey,
    session_id: SessionId,
    sharing: SharingConfig,
    round: u32,
    contributions: BTreeMap<IdentityKey, Contribution>,
    received_commitments: BTreeMap<IdentityKey, Commitment>,
}

impl Participant {
    pub fn new(
        my_identity: IdentityKey,
        session_id: &SessionId,
        participants: &BTreeSet<IdentityKey>,
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
        Ok(Self {
            my_identity,
            session_id: *session_id,
            sharing: SharingConfig::new(participants),
            round: 1,
            contributions: BTreeMap::new(),
            received_commitments: BTreeMap::new(),
        })
    }

    fn others(&self) -> impl Iterator<Item = &IdentityKey> {
        self.sharing
            .iter()
            .map(|(_, identity)| identity)
            .filter(move |identity| **identity != self.my_identity)
    }

    #[instrument(skip_all, fields(identity = %self.my_identity))]
    pub fn round1(&mut self, rng: &mut impl CryptoRngCore) -> Result<RoundMessages<Round1P2P>> {
        expect_round(self.round, 1)?;

        let mut output = RoundMessages::new();
        let others: Vec<IdentityKey> = self.others().copied().collect();
        for counterparty in others {
            let mut randomness = [0u8; 32];
            rng.fill_bytes(&mut randomness);
            let seed: Seed = Sha3_256::new()
                .chain_update(CONTRIBUTION_DOMAIN)
                .chain_update(self.session_id)
                .chain_update(randomness)
                .finalize()
                .into();
            randomness.zeroize();

            let (commitment, witness) = commitments::commit(
                &self.session_id,
                rng,
                &[
                    &self.my_identity.to_bytes(),
                    &counterparty.to_bytes(),
                    &seed,
                ],
            );
            self.contributions
                .insert(counterparty, Contribution { seed, witness });
            output.insert(counterparty, Round1P2P { commitment });
        }

        self.round = 2;
        debug!(counterparties = output.len(), "PRZS setup round 1 done");
        Ok(output)
    }

    #[instrument(skip_all, fields(identity = %self.my_identity))]
    pub fn round2(
        &mut self,
        input: &RoundMessages<Round1P2P>,
    ) -> Result<RoundMessages<Round2P2P>> {
        expect_round(self.round, 2)?;
        input.validate_from(self.others())?;

        let mut output = RoundMessages::new();
        for (counterparty, message) in input {
            self.received_commitments
                .insert(*counterparty, message.commitment);
            let contribution = self.contributions.get(counterparty).ok_or_else(|| {
                Error::Missing(format!("no seed contribution for {counterparty}"))
            })?;
            output.insert(
                *counterparty,
                Round2P2P {
                    contribution: contribution.seed,
                    witness: contribution.witness.clone(),
                },
            );
        }

        self.round = 3;
        debug!("PRZS setup round 2 done");
        Ok(output)
    }

    #[instrument(skip_all, fields(identity = %self.my_identity))]
    pub fn round3(&mut self, input: &RoundMessages<Round2P2P>) -> Result<PairwiseSeeds> {
        expect_round(self.round, 3)?;
        input.validate_from(self.others())?;

        let my_id = self.sharing.sharing_id(&self.my_identity)?;
        let mut seeds = Vec::with_capacity(input.len());
        for (counterparty, message) in input {
            let commitment = self.received_commitments.get(counterparty).ok_or_else(|| {
                Error::Missing(format!("no commitment from {counterparty}"))
            })?;
            commitments::open(
                &self.session_id,
                commitment,
                &message.witness,
                &[
                    &counterparty.to_bytes(),
                    &self.my_identity.to_bytes(),
                    &message.contribution,
                ],
            )
            .map_err(|e| Error::abort(counterparty, format!("seed opening: {e}")))?;

            let mine = self.contributions.get(counterparty).ok_or_else(|| {
                Error::Missing(format!("no seed contribution for {counterparty}"))
            })?;
            let their_id = self.sharing.sharing_id(counterparty)?;
            let (low, high) = if my_id < their_id {
                (&mine.seed, &message.contribution)
            } else {
                (&message.contribution, &mine.seed)
            };
            let seed: Seed = Sha3_256::new()
                .chain_update(SEED_DOMAIN)
                .chain_update(self.session_id)
                .chain_update(low)
                .chain_update(high)
                .finalize()
                .into();
            seeds.push((*counterparty, seed));
        }

        self.contributions.clear();
        self.round = 4;
        debug!(seeds = seeds.len(), "PRZS setup complete");
        Ok(seeds.into_iter().collect())
    }
}
