//! # DKLs23 Engine
//!
//! Round-based DKLs23 threshold ECDSA over secp256k1 and NIST P-256.
//!
//! This crate provides:
//! - AgreeOnRandom session-id agreement
//! - Pairwise random zero sharing (PRZS setup and sampling)
//! - Verified simplest OT and two-party multiplication over OT extension
//! - Distributed Key Generation (DKG) producing a [`keygen::Shard`]
//! - Interactive and non-interactive Distributed Signature Generation (DSG)
//!
//! ## Protocol Overview
//!
//! Every protocol is a participant object whose round methods consume the
//! previous round's [`messages::RoundMessages`] and return the next ones.
//! Transport is left to the caller. A failed cryptographic check names the
//! culprit through [`Error::IdentifiableAbort`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use dkls23_engine::{keygen, sign};
//!
//! let mut party = keygen::Participant::<k256::Secp256k1>::new(&session_id, &auth_key, cohort)?;
//! let (broadcast, p2p) = party.round1(&mut OsRng)?;
//! // ... rounds 2 to 6 ...
//! let shard = party.round6(&round5_messages)?;
//!
//! let mut cosigner = sign::Cosigner::new(&sign_session_id, &auth_key, &shard, &quorum)?;
//! // ... rounds 1 and 2 ...
//! let partial = cosigner.round3(&broadcasts, &p2p, b"message")?;
//! ```

pub mod agree_on_random;
pub mod commitments;
pub mod curve;
pub mod error;
pub mod keygen;
pub mod math;
pub mod messages;
pub mod mult;
pub mod oblivious;
pub mod participants;
pub mod proofs;
pub mod sign;
pub mod transcript;
pub mod types;
pub mod vss;
pub mod zero;

#[cfg(test)]
mod testing;

pub use curve::EcdsaCurve;
pub use error::{Error, Result};
pub use participants::CohortConfig;
pub use types::{AuthKey, IdentityKey, SessionId, SharingId, Signature};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Length in bytes of session ids and pairwise seeds.
pub const LAMBDA: usize = 32;
