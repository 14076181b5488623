//! Signing round messages

use elliptic_curve::group::Group;
use serde::{Deserialize, Serialize};

use crate::commitments::{Commitment, Witness};
use crate::curve::{EcdsaCurve, Point, Scalar};
use crate::messages::Validate;
use crate::mult;
use crate::{Error, Result};

/// Round 1 P2P: commitment to our nonce point and Bob's extension message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round1P2P {
    pub commitment: Commitment,
    pub mult: mult::Round1Output,
}

/// Round 2 broadcast: nonce point `R_i` and re-randomized key share point `Pk_i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round2Broadcast<C: EcdsaCurve> {
    pub big_r: Point<C>,
    pub public_share: Point<C>,
}

/// Round 2 P2P: Alice's reply, the cross-term commitments and the opening of round 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round2P2P<C: EcdsaCurve> {
    pub mult: mult::Round2Output<C, 2>,
    pub gamma_u: Point<C>,
    pub gamma_v: Point<C>,
    pub psi: Scalar<C>,
    pub witness: Witness,
}

impl Validate for Round1P2P {
    fn validate(&self) -> Result<()> {
        self.commitment.validate()?;
        self.mult.validate()
    }
}

impl<C: EcdsaCurve> Validate for Round2Broadcast<C> {
    fn validate(&self) -> Result<()> {
        if bool::from(self.big_r.is_identity()) {
            return Err(Error::InvalidArgument("identity nonce point".into()));
        }
        if bool::from(self.public_share.is_identity()) {
            return Err(Error::InvalidArgument("identity public share".into()));
        }
        Ok(())
    }
}

impl<C: EcdsaCurve> Validate for Round2P2P<C> {
    fn validate(&self) -> Result<()> {
        self.mult.validate()?;
        self.witness.validate()?;
        if bool::from(self.gamma_u.is_identity()) || bool::from(self.gamma_v.is_identity()) {
            return Err(Error::InvalidArgument("identity cross-term commitment".into()));
        }
        Ok(())
    }
}
