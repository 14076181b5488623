//! Zero-knowledge proofs

pub mod dlog;
