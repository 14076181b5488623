//! Pairwise random zero sharing (PRZS).
//!
//! [`setup`] establishes a symmetric seed with every other participant;
//! [`sample`] turns those seeds into additive shares of zero for any subset
//! of present participants without further interaction.

pub mod sample;
pub mod setup;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::types::{IdentityKey, Seed};
use crate::{Error, Result};

pub use sample::Sampler;

/// Seeds shared with every other cohort member.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseSeeds(BTreeMap<IdentityKey, Seed>);

impl PairwiseSeeds {
    pub fn get(&self, counterparty: &IdentityKey) -> Result<&Seed> {
        self.0
            .get(counterparty)
            .ok_or_else(|| Error::Missing(format!("no pairwise seed for {counterparty}")))
    }

    pub fn keys(&self) -> impl Iterator<Item = &IdentityKey> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(IdentityKey, Seed)> for PairwiseSeeds {
    fn from_iter<I: IntoIterator<Item = (IdentityKey, Seed)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Drop for PairwiseSeeds {
    fn drop(&mut self) {
        for seed in self.0.values_mut() {
            seed.zeroize();
        }
    }
}

impl std::fmt::Debug for PairwiseSeeds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
