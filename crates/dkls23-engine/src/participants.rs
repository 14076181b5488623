//! Cohort configuration and canonical sharing ids

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::curve::EcdsaCurve;
use crate::types::{IdentityKey, SharingId};
use crate::{Error, Result};

/// Bijection between sharing ids and identity keys.
///
/// Ids are assigned `1..=n` in ascending identity-key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingConfig {
    by_id: BTreeMap<SharingId, IdentityKey>,
    by_identity: BTreeMap<IdentityKey, SharingId>,
}

impl SharingConfig {
    pub fn new<'a>(participants: impl IntoIterator<Item = &'a IdentityKey>) -> Self {
        let sorted: BTreeSet<IdentityKey> = participants.into_iter().copied().collect();
        let by_id: BTreeMap<SharingId, IdentityKey> = sorted
            .into_iter()
            .zip(1..)
            .map(|(identity, id)| (id, identity))
            .collect();
        let by_identity = by_id.iter().map(|(id, identity)| (*identity, *id)).collect();
        Self { by_id, by_identity }
    }

    pub fn sharing_id(&self, identity: &IdentityKey) -> Result<SharingId> {
        self.by_identity
            .get(identity)
            .copied()
            .ok_or_else(|| Error::Missing(format!("no sharing id for {identity}")))
    }

    pub fn identity(&self, id: SharingId) -> Result<&IdentityKey> {
        self.by_id
            .get(&id)
            .ok_or_else(|| Error::Missing(format!("no identity for sharing id {id}")))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SharingId, &IdentityKey)> {
        self.by_id.iter().map(|(id, identity)| (*id, identity))
    }
}

/// Immutable configuration of a threshold key's cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct CohortConfig<C: EcdsaCurve> {
    curve: String,
    participants: BTreeSet<IdentityKey>,
    threshold: usize,
    total: usize,
    aggregators: Option<BTreeSet<IdentityKey>>,
    #[serde(skip)]
    _curve: PhantomData<C>,
}

impl<C: EcdsaCurve> CohortConfig<C> {
    pub fn new(
        participants: BTreeSet<IdentityKey>,
        threshold: usize,
        aggregators: Option<BTreeSet<IdentityKey>>,
    ) -> Result<Self> {
        let config = Self {
            curve: C::NAME.to_string(),
            total: participants.len(),
            participants,
            threshold,
            aggregators,
            _curve: PhantomData,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.curve != C::NAME {
            return Err(Error::InvalidArgument(format!(
                "config is for curve {}, expected {}",
                self.curve,
                C::NAME
            )));
        }
        if self.participants.len() < 2 {
            return Err(Error::InvalidArgument(
                "at least two participants are required".into(),
            ));
        }
        if self.total != self.participants.len() {
            return Err(Error::InvalidArgument(format!(
                "total parties {} does not match {} participants",
                self.total,
                self.participants.len()
            )));
        }
        if self.threshold < 2 {
            return Err(Error::InvalidArgument("Threshold must be at least 2".into()));
        }
        if self.threshold > self.total {
            return Err(Error::InvalidArgument(
                "Threshold cannot exceed number of parties".into(),
            ));
        }
        if let Some(aggregators) = &self.aggregators {
            if aggregators.is_empty() || !aggregators.is_subset(&self.participants) {
                return Err(Error::InvalidArgument(
                    "aggregators must be a non-empty subset of participants".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn participants(&self) -> &BTreeSet<IdentityKey> {
        &self.participants
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn aggregators(&self) -> Option<&BTreeSet<IdentityKey>> {
        self.aggregators.as_ref()
    }

    /// Whether `identity` may aggregate partial signatures.
    pub fn is_aggregator(&self, identity: &IdentityKey) -> bool {
        match &self.aggregators {
            Some(aggregators) => aggregators.contains(identity),
            None => self.participants.contains(identity),
        }
    }

    pub fn sharing_config(&self) -> SharingConfig {
        SharingConfig::new(&self.participants)
    }

    /// Checks that `quorum` can sign: a subset of the cohort of at least `t` members.
    pub fn validate_quorum(&self, quorum: &BTreeSet<IdentityKey>) -> Result<()> {
        if !quorum.is_subset(&self.participants) {
            return Err(Error::InvalidArgument(
                "quorum must be a subset of the cohort".into(),
            ));
        }
        if quorum.len() < self.threshold {
            return Err(Error::InvalidArgument(format!(
                "Threshold not met: required {}, got {}",
                self.threshold,
                quorum.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthKey;
    use rand::rngs::OsRng;

    fn identities(n: usize) -> BTreeSet<IdentityKey> {
        (0..n)
            .map(|_| AuthKey::random(&mut OsRng).identity_key())
            .collect()
    }

    #[test]
    fn test_sharing_ids_follow_key_order() {
        let ids = identities(4);
        let sharing = SharingConfig::new(&ids);
        let ordered: Vec<_> = sharing.iter().map(|(_, identity)| *identity).collect();
        let expected: Vec<_> = ids.iter().copied().collect();

        assert_eq!(ordered, expected);
        assert_eq!(sharing.sharing_id(&expected[0]).unwrap(), 1);
        assert_eq!(sharing.identity(4).unwrap(), &expected[3]);
        assert!(sharing.identity(5).is_err());
    }

    #[test]
    fn test_config_validation() {
        let ids = identities(3);
        assert!(CohortConfig::<k256::Secp256k1>::new(ids.clone(), 2, None).is_ok());
        assert!(CohortConfig::<k256::Secp256k1>::new(ids.clone(), 4, None).is_err());
        assert!(CohortConfig::<k256::Secp256k1>::new(ids.clone(), 1, None).is_err());
        assert!(CohortConfig::<k256::Secp256k1>::new(identities(1), 1, None).is_err());

        let outsider = identities(1);
        assert!(CohortConfig::<k256::Secp256k1>::new(ids, 2, Some(outsider)).is_err());
    }

    #[test]
    fn test_config_json() {
        let ids = identities(3);
        let config = CohortConfig::<k256::Secp256k1>::new(ids, 2, None).unwrap();
        let json = config.to_json().unwrap();

        let decoded = CohortConfig::<k256::Secp256k1>::from_json(&json).unwrap();
        assert_eq!(config, decoded);

        // curve mismatch
        assert!(CohortConfig::<p256::NistP256>::from_json(&json).is_err());
    }

    #[test]
    fn test_quorum_validation() {
        let ids = identities(4);
        let config = CohortConfig::<k256::Secp256k1>::new(ids.clone(), 3, None).unwrap();
        let mut quorum: BTreeSet<_> = ids.iter().take(3).copied().collect();
        assert!(config.validate_quorum(&quorum).is_ok());

        quorum.pop_first();
        assert!(config.validate_quorum(&quorum).is_err());
    }
}
