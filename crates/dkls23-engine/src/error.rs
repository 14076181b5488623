//! Error types for DKLs23 operations

use std::fmt::Display;

use thiserror::Error;

use crate::types::IdentityKey;

/// Result type alias for DKLs23 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during DKLs23 protocol execution
#[derive(Debug, Error)]
pub enum Error {
    /// Bad construction parameters or malformed local input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A round method was called out of sequence
    #[error("Invalid round: expected {expected}, got {actual}")]
    InvalidRound { expected: u32, actual: u32 },

    /// An expected message, field or pairwise value is absent
    #[error("Missing: {0}")]
    Missing(String),

    /// A consistency check failed and the culprit is known
    #[error("Identifiable abort caused by {culprit}: {reason}")]
    IdentifiableAbort { culprit: IdentityKey, reason: String },

    /// A consistency check failed and nobody can be blamed
    #[error("Total abort: {0}")]
    TotalAbort(String),

    /// A final output failed independent verification
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// A computation produced a degenerate value
    #[error("Failed: {0}")]
    Failed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    Derivation(String),
}

impl Error {
    pub(crate) fn abort(culprit: &IdentityKey, reason: impl Into<String>) -> Self {
        Error::IdentifiableAbort {
            culprit: *culprit,
            reason: reason.into(),
        }
    }

    /// The participant blamed by an identifiable abort.
    pub fn culprit(&self) -> Option<&IdentityKey> {
        match self {
            Error::IdentifiableAbort { culprit, .. } => Some(culprit),
            _ => None,
        }
    }

    /// Whether the session must be abandoned because of a failed cryptographic check.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            Error::IdentifiableAbort { .. } | Error::TotalAbort(_)
        )
    }

    /// Prefix the message with `context`, keeping the kind.
    pub fn context(self, context: impl Display) -> Self {
        match self {
            Error::InvalidArgument(m) => Error::InvalidArgument(format!("{context}: {m}")),
            Error::Missing(m) => Error::Missing(format!("{context}: {m}")),
            Error::IdentifiableAbort { culprit, reason } => Error::IdentifiableAbort {
                culprit,
                reason: format!("{context}: {reason}"),
            },
            Error::TotalAbort(m) => Error::TotalAbort(format!("{context}: {m}")),
            Error::VerificationFailed(m) => Error::VerificationFailed(format!("{context}: {m}")),
            Error::Failed(m) => Error::Failed(format!("{context}: {m}")),
            Error::Serialization(m) => Error::Serialization(format!("{context}: {m}")),
            Error::Derivation(m) => Error::Derivation(format!("{context}: {m}")),
            e @ Error::InvalidRound { .. } => e,
        }
    }
}

/// Attach context to a failed sub-protocol step.
pub trait ResultExt<T> {
    fn context(self, context: impl Display) -> Result<T>;

    fn with_context<D: Display>(self, f: impl FnOnce() -> D) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Display) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<D: Display>(self, f: impl FnOnce() -> D) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthKey;

    #[test]
    fn test_context_keeps_kind() {
        let culprit = AuthKey::from_bytes(&[7u8; 32]).identity_key();
        let err = Error::abort(&culprit, "bad opening").context("round 3");

        assert!(err.is_abort());
        assert_eq!(err.culprit(), Some(&culprit));
        assert!(err.to_string().contains("round 3: bad opening"));

        let err = Error::InvalidRound {
            expected: 2,
            actual: 1,
        }
        .context("dkg");
        assert!(matches!(
            err,
            Error::InvalidRound {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_total_abort_has_no_culprit() {
        let err: Result<()> = Err(Error::TotalAbort("public key mismatch".into()));
        let err = err.context("signing").unwrap_err();

        assert!(err.is_abort());
        assert!(err.culprit().is_none());
    }
}
