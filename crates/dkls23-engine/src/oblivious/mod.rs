//! Oblivious transfer
//!
//! - [`vsot`]: verified simplest OT, the base OT run pairwise during DKG
//! - [`extension`]: bit-matrix and PRG helpers for IKNP/KOS extension

pub mod extension;
pub mod vsot;

use serde::{Deserialize, Serialize};
use subtle::{Choice, ConditionallySelectable};
use zeroize::Zeroize;

use crate::{Error, Result};

/// Number of base OTs per ordered pair of participants.
pub const BASE_OT_BATCH: usize = 128;

/// Sender side of a batch of random OTs: both pads of every instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRotOutput {
    pub message_pairs: Vec<([u8; 32], [u8; 32])>,
}

/// Receiver side of a batch of random OTs: choice bits and the chosen pads.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverRotOutput {
    /// Bit `i` is the choice of instance `i`.
    pub choices: u128,
    pub chosen_messages: Vec<[u8; 32]>,
}

fn xor32(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

impl SenderRotOutput {
    pub fn validate(&self) -> Result<()> {
        if self.message_pairs.len() != BASE_OT_BATCH {
            return Err(Error::InvalidArgument(format!(
                "expected {BASE_OT_BATCH} message pairs, got {}",
                self.message_pairs.len()
            )));
        }
        Ok(())
    }

    /// One-time-pad encrypt a pair of messages per instance.
    pub fn encrypt(&self, messages: &[([u8; 32], [u8; 32])]) -> Result<Vec<([u8; 32], [u8; 32])>> {
        if messages.len() != self.message_pairs.len() {
            return Err(Error::InvalidArgument("message count mismatch".into()));
        }
        Ok(messages
            .iter()
            .zip(&self.message_pairs)
            .map(|((m0, m1), (p0, p1))| (xor32(m0, p0), xor32(m1, p1)))
            .collect())
    }
}

impl ReceiverRotOutput {
    pub fn validate(&self) -> Result<()> {
        if self.chosen_messages.len() != BASE_OT_BATCH {
            return Err(Error::InvalidArgument(format!(
                "expected {BASE_OT_BATCH} chosen messages, got {}",
                self.chosen_messages.len()
            )));
        }
        Ok(())
    }

    pub fn choice(&self, index: usize) -> Choice {
        Choice::from(((self.choices >> index) & 1) as u8)
    }

    /// Recover the chosen message of every instance.
    pub fn decrypt(&self, ciphertexts: &[([u8; 32], [u8; 32])]) -> Result<Vec<[u8; 32]>> {
        if ciphertexts.len() != self.chosen_messages.len() {
            return Err(Error::InvalidArgument("ciphertext count mismatch".into()));
        }
        Ok(ciphertexts
            .iter()
            .zip(&self.chosen_messages)
            .enumerate()
            .map(|(i, ((c0, c1), pad))| {
                let choice = self.choice(i);
                let mut selected = [0u8; 32];
                for (k, byte) in selected.iter_mut().enumerate() {
                    *byte = u8::conditional_select(&c0[k], &c1[k], choice);
                }
                xor32(&selected, pad)
            })
            .collect())
    }
}

impl Drop for SenderRotOutput {
    fn drop(&mut self) {
        for (p0, p1) in self.message_pairs.iter_mut() {
            p0.zeroize();
            p1.zeroize();
        }
    }
}

impl Drop for ReceiverRotOutput {
    fn drop(&mut self) {
        self.choices.zeroize();
        self.chosen_messages.zeroize();
    }
}

impl std::fmt::Debug for SenderRotOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderRotOutput")
            .field("batch", &self.message_pairs.len())
            .finish()
    }
}

impl std::fmt::Debug for ReceiverRotOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverRotOutput")
            .field("batch", &self.chosen_messages.len())
            .finish()
    }
}
