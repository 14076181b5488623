//! PRZS sampling: additive shares of zero from pairwise seeds.

use std::collections::BTreeSet;
use std::marker::PhantomData;

use elliptic_curve::ff::Field;
use sha3::{Digest, Sha3_512};
use tracing::debug;

use super::PairwiseSeeds;
use crate::curve::{EcdsaCurve, Scalar};
use crate::participants::SharingConfig;
use crate::types::{IdentityKey, SessionId};
use crate::{Error, Result};

const SAMPLE_DOMAIN: &[u8] = b"dkls23 przs sample";

/// Samples this participant's share of zero for a set of present participants.
pub struct Sampler<'a, C: EcdsaCurve> {
    my_identity: IdentityKey,
    session_id: SessionId,
    seeds: &'a PairwiseSeeds,
    present: SharingConfig,
    encoding: Vec<u8>,
    _curve: PhantomData<C>,
}

impl<'a, C: EcdsaCurve> Sampler<'a, C> {
    pub fn new(
        my_identity: IdentityKey,
        session_id: &SessionId,
        seeds: &'a PairwiseSeeds,
        present: &BTreeSet<IdentityKey>,
    ) -> Result<Self> {
        if present.len() < 2 {
            return Err(Error::InvalidArgument(
                "at least two present participants are required".into(),
            ));
        }
        if !present.contains(&my_identity) {
            return Err(Error::InvalidArgument(format!(
                "{my_identity} is not present"
            )));
        }
        let encoding = present.iter().flat_map(|identity| identity.to_bytes()).collect();
        Ok(Self {
            my_identity,
            session_id: *session_id,
            seeds,
            present: SharingConfig::new(present),
            encoding,
            _curve: PhantomData,
        })
    }

    fn pairwise_value(&self, seed: &[u8; 32]) -> Scalar<C> {
        let digest = Sha3_512::new()
            .chain_update(SAMPLE_DOMAIN)
            .chain_update(C::NAME)
            .chain_update(self.session_id)
            .chain_update(&self.encoding)
            .chain_update(seed)
            .finalize();
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&digest);
        C::reduce_wide(&wide)
    }

    /// Σ_j sign(i, j) · H(sid, present set, seed_ij), with sign = +1 iff id(i) < id(j).
    pub fn sample(&self) -> Result<Scalar<C>> {
        let my_id = self.present.sharing_id(&self.my_identity)?;
        let mut sample = Scalar::<C>::ZERO;
        for (id, counterparty) in self.present.iter() {
            if id == my_id {
                continue;
            }
            let value = self.pairwise_value(self.seeds.get(counterparty)?);
            if my_id < id {
                sample += value;
            } else {
                sample -= value;
            }
        }

        if bool::from(sample.is_zero()) {
            return Err(Error::Failed("zero share sample is zero".into()));
        }
        debug!(present = self.present.len(), "Sampled zero share");
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::identities;
    use k256::Secp256k1;
    use rand::{rngs::OsRng, RngCore};
    use std::collections::BTreeMap;

    fn dealt_seeds(set: &BTreeSet<IdentityKey>) -> BTreeMap<IdentityKey, PairwiseSeeds> {
        let mut pairs = BTreeMap::new();
        for i in set {
            for j in set.range(i..).skip(1) {
                let mut seed = [0u8; 32];
                OsRng.fill_bytes(&mut seed);
                pairs.insert((*i, *j), seed);
                pairs.insert((*j, *i), seed);
            }
        }
        set.iter()
            .map(|i| {
                let seeds = pairs
                    .iter()
                    .filter(|((a, _), _)| a == i)
                    .map(|((_, b), seed)| (*b, *seed))
                    .collect();
                (*i, seeds)
            })
            .collect()
    }

    fn sum_samples(
        seeds: &BTreeMap<IdentityKey, PairwiseSeeds>,
        present: &BTreeSet<IdentityKey>,
        summed: &BTreeSet<IdentityKey>,
        sid_of: impl Fn(&IdentityKey) -> SessionId,
    ) -> k256::Scalar {
        summed
            .iter()
            .map(|identity| {
                Sampler::<Secp256k1>::new(*identity, &sid_of(identity), &seeds[identity], present)
                    .unwrap()
                    .sample()
                    .unwrap()
            })
            .sum()
    }

    #[test]
    fn test_samples_sum_to_zero() {
        let (_, set) = identities(5);
        let seeds = dealt_seeds(&set);
        let sid = [5u8; 32];

        let total = sum_samples(&seeds, &set, &set, |_| sid);
        assert_eq!(total, k256::Scalar::ZERO);

        // any present subset works
        let subset: BTreeSet<_> = set.iter().skip(2).copied().collect();
        let total = sum_samples(&seeds, &subset, &subset, |_| sid);
        assert_eq!(total, k256::Scalar::ZERO);
    }

    #[test]
    fn test_partial_sum_is_not_zero() {
        let (_, set) = identities(4);
        let seeds = dealt_seeds(&set);
        let sid = [5u8; 32];
        let summed: BTreeSet<_> = set.iter().skip(1).copied().collect();

        let total = sum_samples(&seeds, &set, &summed, |_| sid);
        assert_ne!(total, k256::Scalar::ZERO);
    }

    #[test]
    fn test_divergent_session_id_breaks_zero_sum() {
        let (_, set) = identities(4);
        let seeds = dealt_seeds(&set);
        let odd_one = *set.iter().next().unwrap();

        let total = sum_samples(&seeds, &set, &set, |identity| {
            if *identity == odd_one {
                [6u8; 32]
            } else {
                [5u8; 32]
            }
        });
        assert_ne!(total, k256::Scalar::ZERO);
    }

    #[test]
    fn test_missing_seed() {
        let (_, set) = identities(3);
        let (_, stranger) = identities(1);
        let seeds = dealt_seeds(&set);
        let me = *set.iter().next().unwrap();
        let mut present: BTreeSet<_> = set.iter().take(2).copied().collect();
        present.extend(stranger);

        let err = Sampler::<Secp256k1>::new(me, &[5u8; 32], &seeds[&me], &present)
            .unwrap()
            .sample()
            .unwrap_err();
        assert!(matches!(err, Error::Missing(_)));
    }
}
