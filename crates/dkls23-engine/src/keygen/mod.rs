//! Distributed Key Generation (DKG) module
//!
//! A six-round DKG that runs Feldman VSS, PRZS setup and one base OT batch in
//! each direction between every pair of participants. Its output is a
//! [`Shard`], the long-lived input of signing.

mod dkg;
mod messages;
mod shard;
pub mod trusted_dealer;

pub use dkg::Participant;
pub use messages::*;
pub use shard::{
    BaseOtPair, ChainCode, DerivedShard, PairwiseBaseOts, PublicKeyShares, Shard, SigningKeyShare,
    HARDENED_OFFSET,
};
