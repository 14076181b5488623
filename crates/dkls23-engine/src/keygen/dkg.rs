//! DKG participant

use std::collections::BTreeMap;

use rand_core::CryptoRngCore;
use tracing::{debug, info, instrument};

use super::messages::*;
use super::shard::{BaseOtPair, PairwiseBaseOts, PublicKeyShares, Shard, SigningKeyShare};
use crate::curve::EcdsaCurve;
use crate::error::ResultExt;
use crate::messages::{expect_round, RoundMessages};
use crate::oblivious::{vsot, SenderRotOutput};
use crate::participants::CohortConfig;
use crate::types::{AuthKey, IdentityKey, SessionId, SharingId};
use crate::zero::{setup as przs, PairwiseSeeds};
use crate::{vss, Error, Result};

/// One party of the DKG.
///
/// Round methods must be called in order, each with the messages every other
/// cohort member produced in the previous round.
pub struct Participant<C: EcdsaCurve> {
    my_identity: IdentityKey,
    my_id: SharingId,
    cohort: CohortConfig<C>,
    round: u32,
    vss: vss::Participant<C>,
    przs: przs::Participant,
    ot_senders: BTreeMap<IdentityKey, vsot::Sender<C>>,
    ot_receivers: BTreeMap<IdentityKey, vsot::Receiver<C>>,
    key_shares: Option<(SigningKeyShare<C>, PublicKeyShares<C>)>,
    seeds: Option<PairwiseSeeds>,
    sender_outputs: BTreeMap<IdentityKey, SenderRotOutput>,
}

impl<C: EcdsaCurve> Participant<C> {
    pub fn new(session_id: &SessionId, auth_key: &AuthKey, cohort: CohortConfig<C>) -> Result<Self> {
        if *session_id == [0u8; 32] {
            return Err(Error::InvalidArgument("empty session id".into()));
        }
        cohort.validate()?;
        let my_identity = auth_key.identity_key();
        let my_id = cohort.sharing_config().sharing_id(&my_identity)?;

        let vss = vss::Participant::new(my_identity, session_id, &cohort)?;
        let przs = przs::Participant::new(my_identity, session_id, cohort.participants())?;
        let others = cohort
            .participants()
            .iter()
            .filter(|identity| **identity != my_identity);
        let ot_senders = others
            .clone()
            .map(|other| (*other, vsot::Sender::new(&my_identity, *other, session_id)))
            .collect();
        let ot_receivers = others
            .map(|other| (*other, vsot::Receiver::new(&my_identity, *other, session_id)))
            .collect();

        info!(
            sharing_id = my_id,
            threshold = cohort.threshold(),
            total = cohort.total(),
            "Starting DKG"
        );

        Ok(Self {
            my_identity,
            my_id,
            cohort,
            round: 1,
            vss,
            przs,
            ot_senders,
            ot_receivers,
            key_shares: None,
            seeds: None,
            sender_outputs: BTreeMap::new(),
        })
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.my_identity
    }

    pub fn sharing_id(&self) -> SharingId {
        self.my_id
    }

    fn others(&self) -> Vec<IdentityKey> {
        self.ot_senders.keys().copied().collect()
    }

    #[instrument(skip_all, fields(sharing_id = self.my_id, round = 1))]
    pub fn round1(
        &mut self,
        rng: &mut impl CryptoRngCore,
    ) -> Result<(Round1Broadcast, RoundMessages<Round1P2P<C>>)> {
        expect_round(self.round, 1)?;
        let (vss_broadcast, mut vss_p2p) = self.vss.round1(rng).context("VSS round 1")?;
        let mut przs_p2p = self.przs.round1(rng).context("PRZS round 1")?;

        let mut output = RoundMessages::new();
        for (other, sender) in self.ot_senders.iter_mut() {
            output.insert(
                *other,
                Round1P2P {
                    vss: vss_p2p.remove(other)?,
                    przs: przs_p2p.remove(other)?,
                    base_ot: sender.round1(rng)?,
                },
            );
        }
        self.round = 2;
        debug!("DKG round 1 complete");
        Ok((Round1Broadcast { vss: vss_broadcast }, output))
    }

    #[instrument(skip_all, fields(sharing_id = self.my_id, round = 2))]
    pub fn round2(
        &mut self,
        rng: &mut impl CryptoRngCore,
        broadcasts: &RoundMessages<Round1Broadcast>,
        p2p: &RoundMessages<Round1P2P<C>>,
    ) -> Result<(Round2Broadcast<C>, RoundMessages<Round2P2P<C>>)> {
        expect_round(self.round, 2)?;
        let others = self.others();
        broadcasts.validate_from(&others)?;
        p2p.validate_from(&others)?;

        let vss_broadcast = self
            .vss
            .round2(
                rng,
                &broadcasts.map(|message| message.vss),
                &p2p.map(|message| message.vss.clone()),
            )
            .context("VSS round 2")?;
        let mut przs_p2p = self
            .przs
            .round2(&p2p.map(|message| message.przs.clone()))
            .context("PRZS round 2")?;

        let mut output = RoundMessages::new();
        for (other, receiver) in self.ot_receivers.iter_mut() {
            let base_ot = receiver
                .round2(rng, &p2p.get(other)?.base_ot)
                .with_context(|| format!("base OT round 2 with {other}"))?;
            output.insert(
                *other,
                Round2P2P {
                    przs: przs_p2p.remove(other)?,
                    base_ot,
                },
            );
        }
        self.round = 3;
        debug!("DKG round 2 complete");
        Ok((Round2Broadcast { vss: vss_broadcast }, output))
    }

    #[instrument(skip_all, fields(sharing_id = self.my_id, round = 3))]
    pub fn round3(
        &mut self,
        broadcasts: &RoundMessages<Round2Broadcast<C>>,
        p2p: &RoundMessages<Round2P2P<C>>,
    ) -> Result<RoundMessages<Round3P2P>> {
        expect_round(self.round, 3)?;
        let others = self.others();
        broadcasts.validate_from(&others)?;
        p2p.validate_from(&others)?;

        let key_shares = self
            .vss
            .round3(&broadcasts.map(|message| message.vss.clone()))
            .context("VSS round 3")?;
        let seeds = self
            .przs
            .round3(&p2p.map(|message| message.przs.clone()))
            .context("PRZS round 3")?;

        let mut output = RoundMessages::new();
        for (other, sender) in self.ot_senders.iter_mut() {
            let base_ot = sender
                .round3(&p2p.get(other)?.base_ot)
                .with_context(|| format!("base OT round 3 with {other}"))?;
            output.insert(*other, Round3P2P { base_ot });
        }
        self.key_shares = Some(key_shares);
        self.seeds = Some(seeds);
        self.round = 4;
        debug!("DKG round 3 complete");
        Ok(output)
    }

    #[instrument(skip_all, fields(sharing_id = self.my_id, round = 4))]
    pub fn round4(&mut self, p2p: &RoundMessages<Round3P2P>) -> Result<RoundMessages<Round4P2P>> {
        expect_round(self.round, 4)?;
        p2p.validate_from(&self.others())?;

        let mut output = RoundMessages::new();
        for (other, receiver) in self.ot_receivers.iter_mut() {
            let base_ot = receiver
                .round4(&p2p.get(other)?.base_ot)
                .with_context(|| format!("base OT round 4 with {other}"))?;
            output.insert(*other, Round4P2P { base_ot });
        }
        self.round = 5;
        Ok(output)
    }

    #[instrument(skip_all, fields(sharing_id = self.my_id, round = 5))]
    pub fn round5(&mut self, p2p: &RoundMessages<Round4P2P>) -> Result<RoundMessages<Round5P2P>> {
        expect_round(self.round, 5)?;
        p2p.validate_from(&self.others())?;

        let mut output = RoundMessages::new();
        for (other, sender) in self.ot_senders.iter_mut() {
            let (base_ot, rot) = sender
                .round5(&p2p.get(other)?.base_ot)
                .with_context(|| format!("base OT round 5 with {other}"))?;
            self.sender_outputs.insert(*other, rot);
            output.insert(*other, Round5P2P { base_ot });
        }
        self.round = 6;
        Ok(output)
    }

    /// Finish the base OTs and assemble the shard.
    #[instrument(skip_all, fields(sharing_id = self.my_id, round = 6))]
    pub fn round6(&mut self, p2p: &RoundMessages<Round5P2P>) -> Result<Shard<C>> {
        expect_round(self.round, 6)?;
        p2p.validate_from(&self.others())?;

        let mut base_ots = PairwiseBaseOts::new();
        for (other, receiver) in self.ot_receivers.iter_mut() {
            let as_receiver = receiver
                .round6(&p2p.get(other)?.base_ot)
                .with_context(|| format!("base OT round 6 with {other}"))?;
            let as_sender = self
                .sender_outputs
                .remove(other)
                .ok_or_else(|| Error::Missing(format!("base OT sender output for {other}")))?;
            base_ots.insert(
                *other,
                BaseOtPair {
                    as_sender,
                    as_receiver,
                },
            );
        }

        let (signing_key_share, public_key_shares) = self
            .key_shares
            .take()
            .ok_or_else(|| Error::Missing("VSS output".into()))?;
        let seeds = self
            .seeds
            .take()
            .ok_or_else(|| Error::Missing("pairwise seeds".into()))?;

        let shard = Shard::new(
            self.cohort.clone(),
            self.my_identity,
            signing_key_share,
            public_key_shares,
            seeds,
            base_ots,
        )?;
        self.round = 7;
        info!(
            sharing_id = self.my_id,
            public_key = %hex::encode(C::point_to_bytes(shard.public_key())),
            "DKG complete"
        );
        Ok(shard)
    }
}
