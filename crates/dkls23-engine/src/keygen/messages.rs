//! DKG round messages: per-round bundles of the sub-protocol messages.

use serde::{Deserialize, Serialize};

use crate::curve::EcdsaCurve;
use crate::messages::Validate;
use crate::oblivious::vsot;
use crate::zero::setup as przs;
use crate::{vss, Result};

/// Round 1 broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round1Broadcast {
    pub vss: vss::Round1Broadcast,
}

/// Round 1 P2P
#[derive(Debug, Clone)]
pub struct Round1P2P<C: EcdsaCurve> {
    pub vss: vss::Round1P2P<C>,
    pub przs: przs::Round1P2P,
    pub base_ot: vsot::Round1Output<C>,
}

/// Round 2 broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round2Broadcast<C: EcdsaCurve> {
    pub vss: vss::Round2Broadcast<C>,
}

/// Round 2 P2P
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round2P2P<C: EcdsaCurve> {
    pub przs: przs::Round2P2P,
    pub base_ot: vsot::Round2Output<C>,
}

/// Round 3 P2P
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round3P2P {
    pub base_ot: vsot::Round3Output,
}

/// Round 4 P2P
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round4P2P {
    pub base_ot: vsot::Round4Output,
}

/// Round 5 P2P
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round5P2P {
    pub base_ot: vsot::Round5Output,
}

impl Validate for Round1Broadcast {
    fn validate(&self) -> Result<()> {
        self.vss.validate()
    }
}

impl<C: EcdsaCurve> Validate for Round1P2P<C> {
    fn validate(&self) -> Result<()> {
        self.vss.validate()?;
        self.przs.validate()?;
        self.base_ot.validate()
    }
}

impl<C: EcdsaCurve> Validate for Round2Broadcast<C> {
    fn validate(&self) -> Result<()> {
        self.vss.validate()
    }
}

impl<C: EcdsaCurve> Validate for Round2P2P<C> {
    fn validate(&self) -> Result<()> {
        self.przs.validate()?;
        self.base_ot.validate()
    }
}

impl Validate for Round3P2P {
    fn validate(&self) -> Result<()> {
        self.base_ot.validate()
    }
}

impl Validate for Round4P2P {
    fn validate(&self) -> Result<()> {
        self.base_ot.validate()
    }
}

impl Validate for Round5P2P {
    fn validate(&self) -> Result<()> {
        self.base_ot.validate()
    }
}
