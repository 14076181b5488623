//! Shards from a single dealer who knows the secret.
//!
//! Useful for importing an existing key and for tests. The dealer learns
//! every pairwise seed and base OT, so shards dealt this way are only as
//! trustworthy as the dealer.

use std::collections::BTreeMap;

use elliptic_curve::{ff::Field, group::Group};
use rand_core::CryptoRngCore;
use tracing::{info, instrument};

use super::shard::{BaseOtPair, PairwiseBaseOts, PublicKeyShares, Shard, SigningKeyShare};
use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::math::{evaluate_commitment, Polynomial};
use crate::oblivious::{ReceiverRotOutput, SenderRotOutput, BASE_OT_BATCH};
use crate::participants::CohortConfig;
use crate::types::{IdentityKey, Seed};
use crate::zero::PairwiseSeeds;
use crate::{Error, Result};

fn random_rot(rng: &mut impl CryptoRngCore) -> (SenderRotOutput, ReceiverRotOutput) {
    let mut message_pairs = Vec::with_capacity(BASE_OT_BATCH);
    for _ in 0..BASE_OT_BATCH {
        let mut p0 = [0u8; 32];
        let mut p1 = [0u8; 32];
        rng.fill_bytes(&mut p0);
        rng.fill_bytes(&mut p1);
        message_pairs.push((p0, p1));
    }
    let choices = (u128::from(rng.next_u64()) << 64) | u128::from(rng.next_u64());
    let chosen_messages = message_pairs
        .iter()
        .enumerate()
        .map(|(i, (p0, p1))| if (choices >> i) & 1 == 1 { *p1 } else { *p0 })
        .collect();
    (
        SenderRotOutput { message_pairs },
        ReceiverRotOutput {
            choices,
            chosen_messages,
        },
    )
}

/// Split `secret` into one shard per cohort member.
#[instrument(skip_all, fields(threshold = cohort.threshold(), total = cohort.total()))]
pub fn deal<C: EcdsaCurve>(
    cohort: &CohortConfig<C>,
    secret: &Scalar<C>,
    rng: &mut impl CryptoRngCore,
) -> Result<BTreeMap<IdentityKey, Shard<C>>> {
    cohort.validate()?;
    if bool::from(secret.is_zero()) {
        return Err(Error::InvalidArgument("cannot share a zero secret".into()));
    }

    let sharing = cohort.sharing_config();
    let polynomial = Polynomial::<C>::random(rng, *secret, cohort.threshold());
    let feldman_commitments = polynomial.commit();
    let public_key = feldman_commitments[0];
    let public_key_shares = PublicKeyShares {
        public_key,
        feldman_commitments: feldman_commitments.clone(),
        shares: sharing
            .iter()
            .map(|(id, _)| (id, evaluate_commitment::<C>(&feldman_commitments, id)))
            .collect(),
    };

    let mut seeds: BTreeMap<IdentityKey, Vec<(IdentityKey, Seed)>> = BTreeMap::new();
    // keyed by (sender, receiver)
    let mut senders: BTreeMap<(IdentityKey, IdentityKey), SenderRotOutput> = BTreeMap::new();
    let mut receivers: BTreeMap<(IdentityKey, IdentityKey), ReceiverRotOutput> = BTreeMap::new();
    for (i, a) in sharing.iter() {
        for (j, b) in sharing.iter() {
            if i == j {
                continue;
            }
            if i < j {
                let mut seed = [0u8; 32];
                rng.fill_bytes(&mut seed);
                seeds.entry(*a).or_default().push((*b, seed));
                seeds.entry(*b).or_default().push((*a, seed));
            }
            let (sender, receiver) = random_rot(rng);
            senders.insert((*a, *b), sender);
            receivers.insert((*a, *b), receiver);
        }
    }

    let mut base_ots: BTreeMap<IdentityKey, PairwiseBaseOts> = BTreeMap::new();
    for ((me, other), as_sender) in senders {
        let as_receiver = receivers
            .remove(&(other, me))
            .ok_or_else(|| Error::Failed(format!("no base OT from {other} to {me}")))?;
        base_ots.entry(me).or_default().insert(
            other,
            BaseOtPair {
                as_sender,
                as_receiver,
            },
        );
    }

    let mut shards = BTreeMap::new();
    for (id, identity) in sharing.iter() {
        let share = polynomial.evaluate(id);
        let shard = Shard::new(
            cohort.clone(),
            *identity,
            SigningKeyShare {
                share,
                public_key,
            },
            public_key_shares.clone(),
            seeds.remove(identity).unwrap_or_default().into_iter().collect(),
            base_ots.remove(identity).unwrap_or_default(),
        )?;
        shards.insert(*identity, shard);
    }

    info!(
        public_key = %hex::encode(C::point_to_bytes(&public_key)),
        "dealt shards"
    );
    debug_assert_eq!(Point::<C>::generator() * secret, public_key);
    Ok(shards)
}
