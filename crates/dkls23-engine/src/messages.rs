//! Round message containers
//!
//! A round's point-to-point output is a [`RoundMessages`] keyed by recipient;
//! the next round consumes a [`RoundMessages`] keyed by sender. Broadcast
//! values are collected the same way.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;

use crate::types::IdentityKey;
use crate::{Error, Result};

/// Rejects a round call made out of sequence.
pub(crate) fn expect_round(current: u32, expected: u32) -> Result<()> {
    if current != expected {
        return Err(Error::InvalidRound {
            expected,
            actual: current,
        });
    }
    Ok(())
}

/// Structural checks a receiver runs on a message before using it.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Messages of one round, keyed by counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundMessages<V>(BTreeMap<IdentityKey, V>);

impl<V> Default for RoundMessages<V> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<V> RoundMessages<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, counterparty: IdentityKey, message: V) -> Option<V> {
        self.0.insert(counterparty, message)
    }

    pub fn get(&self, counterparty: &IdentityKey) -> Result<&V> {
        self.0
            .get(counterparty)
            .ok_or_else(|| Error::Missing(format!("no message for {counterparty}")))
    }

    pub fn remove(&mut self, counterparty: &IdentityKey) -> Result<V> {
        self.0
            .remove(counterparty)
            .ok_or_else(|| Error::Missing(format!("no message for {counterparty}")))
    }

    pub fn contains(&self, counterparty: &IdentityKey) -> bool {
        self.0.contains_key(counterparty)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, IdentityKey, V> {
        self.0.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, IdentityKey, V> {
        self.0.keys()
    }

    /// Checks that exactly the `expected` counterparties are present.
    ///
    /// A message from anyone else is an identifiable abort against that sender.
    pub fn validate_keys<'a>(&self, expected: impl IntoIterator<Item = &'a IdentityKey>) -> Result<()> {
        let expected: BTreeSet<&IdentityKey> = expected.into_iter().collect();
        for counterparty in &expected {
            if !self.0.contains_key(*counterparty) {
                return Err(Error::Missing(format!("no message from {counterparty}")));
            }
        }
        if let Some(sender) = self.0.keys().find(|sender| !expected.contains(sender)) {
            return Err(Error::abort(sender, "unexpected message"));
        }
        Ok(())
    }

    /// Split off each message's fields into per-subprotocol collections.
    pub fn map<W>(&self, f: impl Fn(&V) -> W) -> RoundMessages<W> {
        RoundMessages(self.0.iter().map(|(k, v)| (*k, f(v))).collect())
    }
}

impl<V: Validate> RoundMessages<V> {
    /// Checks the counterparty set, then every message.
    ///
    /// A malformed message is an identifiable abort against its sender.
    pub fn validate_from<'a>(
        &self,
        expected: impl IntoIterator<Item = &'a IdentityKey>,
    ) -> Result<()> {
        self.validate_keys(expected)?;
        for (sender, message) in &self.0 {
            message
                .validate()
                .map_err(|e| Error::abort(sender, format!("malformed message: {e}")))?;
        }
        Ok(())
    }
}

impl<V> FromIterator<(IdentityKey, V)> for RoundMessages<V> {
    fn from_iter<I: IntoIterator<Item = (IdentityKey, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<V> IntoIterator for RoundMessages<V> {
    type Item = (IdentityKey, V);
    type IntoIter = btree_map::IntoIter<IdentityKey, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, V> IntoIterator for &'a RoundMessages<V> {
    type Item = (&'a IdentityKey, &'a V);
    type IntoIter = btree_map::Iter<'a, IdentityKey, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthKey;
    use rand::rngs::OsRng;

    struct Positive(i32);

    impl Validate for Positive {
        fn validate(&self) -> Result<()> {
            if self.0 > 0 {
                Ok(())
            } else {
                Err(Error::InvalidArgument("not positive".into()))
            }
        }
    }

    #[test]
    fn test_validate_keys() {
        let a = AuthKey::random(&mut OsRng).identity_key();
        let b = AuthKey::random(&mut OsRng).identity_key();
        let c = AuthKey::random(&mut OsRng).identity_key();

        let messages: RoundMessages<Positive> =
            [(a, Positive(1)), (b, Positive(2))].into_iter().collect();
        assert!(messages.validate_from([&a, &b]).is_ok());

        let err = messages.validate_from([&a, &b, &c]).unwrap_err();
        assert!(matches!(err, Error::Missing(_)));

        let err = messages.validate_keys([&a]).unwrap_err();
        assert!(err.is_abort());
        assert_eq!(err.culprit(), Some(&b));
    }

    #[test]
    fn test_malformed_message_blames_sender() {
        let a = AuthKey::random(&mut OsRng).identity_key();
        let b = AuthKey::random(&mut OsRng).identity_key();
        let messages: RoundMessages<Positive> =
            [(a, Positive(1)), (b, Positive(-1))].into_iter().collect();

        let err = messages.validate_from([&a, &b]).unwrap_err();
        assert_eq!(err.culprit(), Some(&b));
    }
}
