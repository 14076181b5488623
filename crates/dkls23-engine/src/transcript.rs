//! Merlin transcript helpers

use merlin::Transcript;

use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::types::SessionId;

/// Operations the protocols need on top of [`merlin::Transcript`].
pub trait TranscriptProtocol {
    fn append_messages(&mut self, label: &'static [u8], messages: &[&[u8]]);

    fn append_point<C: EcdsaCurve>(&mut self, label: &'static [u8], point: &Point<C>);

    fn append_scalar<C: EcdsaCurve>(&mut self, label: &'static [u8], scalar: &Scalar<C>);

    fn extract_bytes<const N: usize>(&mut self, label: &'static [u8]) -> [u8; N];

    fn challenge_scalar<C: EcdsaCurve>(&mut self, label: &'static [u8]) -> Scalar<C>;

    /// Absorbs `session_id` under `domain` and returns the bound session id.
    fn bind(&mut self, session_id: &[u8], domain: &'static [u8]) -> SessionId;
}

impl TranscriptProtocol for Transcript {
    fn append_messages(&mut self, label: &'static [u8], messages: &[&[u8]]) {
        for message in messages {
            self.append_message(label, message);
        }
    }

    fn append_point<C: EcdsaCurve>(&mut self, label: &'static [u8], point: &Point<C>) {
        self.append_message(label, &C::point_to_bytes(point));
    }

    fn append_scalar<C: EcdsaCurve>(&mut self, label: &'static [u8], scalar: &Scalar<C>) {
        self.append_message(label, &C::scalar_to_bytes(scalar));
    }

    fn extract_bytes<const N: usize>(&mut self, label: &'static [u8]) -> [u8; N] {
        let mut out = [0u8; N];
        self.challenge_bytes(label, &mut out);
        out
    }

    fn challenge_scalar<C: EcdsaCurve>(&mut self, label: &'static [u8]) -> Scalar<C> {
        C::reduce_wide(&self.extract_bytes::<64>(label))
    }

    fn bind(&mut self, session_id: &[u8], domain: &'static [u8]) -> SessionId {
        self.append_message(b"domain separation", domain);
        self.append_message(b"session id", session_id);
        self.extract_bytes(b"bound session id")
    }
}
