//! In-memory message routing and protocol drivers for tests.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::OsRng;

use crate::agree_on_random;
use crate::curve::EcdsaCurve;
use crate::keygen::{self, Shard};
use crate::messages::RoundMessages;
use crate::participants::CohortConfig;
use crate::sign::{Cosigner, PartialSignature, PreProcessingMaterial, PreSigner};
use crate::types::{AuthKey, IdentityKey, SessionId};
use crate::Result;

/// Install a test log subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `n` fresh auth keys, sorted by identity, and their identity set.
pub fn identities(n: usize) -> (Vec<AuthKey>, BTreeSet<IdentityKey>) {
    let mut keys: Vec<AuthKey> = (0..n).map(|_| AuthKey::random(&mut OsRng)).collect();
    keys.sort_by_key(AuthKey::identity_key);
    let set = keys.iter().map(AuthKey::identity_key).collect();
    (keys, set)
}

/// Turn sender -> (recipient -> message) into recipient -> (sender -> message).
pub fn route_p2p<V>(
    outgoing: BTreeMap<IdentityKey, RoundMessages<V>>,
) -> BTreeMap<IdentityKey, RoundMessages<V>> {
    let mut incoming: BTreeMap<IdentityKey, RoundMessages<V>> = BTreeMap::new();
    for (sender, messages) in outgoing {
        for (recipient, message) in messages {
            incoming.entry(recipient).or_default().insert(sender, message);
        }
    }
    incoming
}

/// Deliver every sender's broadcast to everyone else.
pub fn broadcast<V: Clone>(
    outgoing: BTreeMap<IdentityKey, V>,
) -> BTreeMap<IdentityKey, RoundMessages<V>> {
    outgoing
        .keys()
        .map(|recipient| {
            let messages = outgoing
                .iter()
                .filter(|(sender, _)| *sender != recipient)
                .map(|(sender, message)| (*sender, message.clone()))
                .collect();
            (*recipient, messages)
        })
        .collect()
}

/// Run AgreeOnRandom among `set` and return the common session id.
pub fn run_agree_on_random<C: EcdsaCurve>(set: &BTreeSet<IdentityKey>) -> SessionId {
    let mut participants: Vec<_> = set
        .iter()
        .map(|identity| agree_on_random::Participant::<C>::new(*identity, set, None).unwrap())
        .collect();
    let contributions: RoundMessages<_> = participants
        .iter_mut()
        .map(|participant| {
            (
                *participant.identity_key(),
                participant.round1(&mut OsRng).unwrap(),
            )
        })
        .collect();

    let session_ids: Vec<SessionId> = participants
        .iter_mut()
        .map(|participant| participant.round2(&contributions).unwrap())
        .collect();
    assert!(session_ids.windows(2).all(|pair| pair[0] == pair[1]));
    session_ids[0]
}

/// Full DKG among `n` fresh identities with threshold `t`.
pub fn run_dkg<C: EcdsaCurve>(
    t: usize,
    n: usize,
) -> Result<(BTreeMap<IdentityKey, Shard<C>>, Vec<AuthKey>)> {
    init_tracing();
    let (keys, set) = identities(n);
    let session_id = run_agree_on_random::<C>(&set);
    let cohort = CohortConfig::<C>::new(set, t, None)?;

    let mut parties = BTreeMap::new();
    for key in &keys {
        parties.insert(
            key.identity_key(),
            keygen::Participant::new(&session_id, key, cohort.clone())?,
        );
    }

    let mut bcast1 = BTreeMap::new();
    let mut p2p1 = BTreeMap::new();
    for (id, party) in parties.iter_mut() {
        let (b, p) = party.round1(&mut OsRng)?;
        bcast1.insert(*id, b);
        p2p1.insert(*id, p);
    }
    let (bcast1, p2p1) = (broadcast(bcast1), route_p2p(p2p1));

    let mut bcast2 = BTreeMap::new();
    let mut p2p2 = BTreeMap::new();
    for (id, party) in parties.iter_mut() {
        let (b, p) = party.round2(&mut OsRng, &bcast1[id], &p2p1[id])?;
        bcast2.insert(*id, b);
        p2p2.insert(*id, p);
    }
    let (bcast2, p2p2) = (broadcast(bcast2), route_p2p(p2p2));

    let mut p2p3 = BTreeMap::new();
    for (id, party) in parties.iter_mut() {
        p2p3.insert(*id, party.round3(&bcast2[id], &p2p2[id])?);
    }
    let p2p3 = route_p2p(p2p3);

    let mut p2p4 = BTreeMap::new();
    for (id, party) in parties.iter_mut() {
        p2p4.insert(*id, party.round4(&p2p3[id])?);
    }
    let p2p4 = route_p2p(p2p4);

    let mut p2p5 = BTreeMap::new();
    for (id, party) in parties.iter_mut() {
        p2p5.insert(*id, party.round5(&p2p4[id])?);
    }
    let p2p5 = route_p2p(p2p5);

    let mut shards = BTreeMap::new();
    for (id, party) in parties.iter_mut() {
        shards.insert(*id, party.round6(&p2p5[id])?);
    }
    Ok((shards, keys))
}

/// Drive `round1` and `round2` of every signer; returns the round 2 inputs of round 3.
macro_rules! run_signing_rounds {
    ($parties:expr) => {{
        let mut p2p1 = BTreeMap::new();
        for (id, party) in $parties.iter_mut() {
            p2p1.insert(*id, party.round1(&mut OsRng)?);
        }
        let p2p1 = route_p2p(p2p1);

        let mut bcast2 = BTreeMap::new();
        let mut p2p2 = BTreeMap::new();
        for (id, party) in $parties.iter_mut() {
            let (b, p) = party.round2(&p2p1[id])?;
            bcast2.insert(*id, b);
            p2p2.insert(*id, p);
        }
        (broadcast(bcast2), route_p2p(p2p2))
    }};
}

/// Interactive signing by `quorum`; returns every partial signature.
pub fn run_signing<C: EcdsaCurve>(
    shards: &BTreeMap<IdentityKey, Shard<C>>,
    keys: &[AuthKey],
    quorum: &BTreeSet<IdentityKey>,
    message: &[u8],
) -> Result<RoundMessages<PartialSignature<C>>> {
    let session_id = run_agree_on_random::<C>(quorum);
    let mut parties = BTreeMap::new();
    for key in keys.iter().filter(|key| quorum.contains(&key.identity_key())) {
        let id = key.identity_key();
        parties.insert(id, Cosigner::new(&session_id, key, &shards[&id], quorum)?);
    }

    let (bcast2, p2p2) = run_signing_rounds!(parties);
    let mut partials = RoundMessages::new();
    for (id, party) in parties.iter_mut() {
        partials.insert(*id, party.round3(&bcast2[id], &p2p2[id], message)?);
    }
    Ok(partials)
}

/// Pre-signing by `quorum`; returns every participant's material.
pub fn run_presigning<C: EcdsaCurve>(
    shards: &BTreeMap<IdentityKey, Shard<C>>,
    keys: &[AuthKey],
    quorum: &BTreeSet<IdentityKey>,
) -> Result<BTreeMap<IdentityKey, PreProcessingMaterial<C>>> {
    let session_id = run_agree_on_random::<C>(quorum);
    let mut parties = BTreeMap::new();
    for key in keys.iter().filter(|key| quorum.contains(&key.identity_key())) {
        let id = key.identity_key();
        parties.insert(id, PreSigner::new(&session_id, key, &shards[&id], quorum)?);
    }

    let (bcast2, p2p2) = run_signing_rounds!(parties);
    let mut materials = BTreeMap::new();
    for (id, party) in parties.iter_mut() {
        materials.insert(*id, party.round3(&bcast2[id], &p2p2[id])?);
    }
    Ok(materials)
}
