use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Body-segment code reported by a wearable sensor.
///
/// The set is fixed at configuration time; the wire protocol carries these
/// as short uppercase strings (e.g. `"RFA"` = right forearm).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JointLabel {
    /// Right forearm.
    #[serde(rename = "RFA")]
    Rfa,
    /// Right upper arm.
    #[serde(rename = "RA")]
    Ra,
    /// Left upper arm.
    #[serde(rename = "LA")]
    La,
    /// Left forearm.
    #[serde(rename = "LFA")]
    Lfa,
    /// Left upper leg.
    #[serde(rename = "LUL")]
    Lul,
    /// Left lower leg.
    #[serde(rename = "LL")]
    Ll,
    /// Right upper leg.
    #[serde(rename = "RUL")]
    Rul,
    /// Right lower leg.
    #[serde(rename = "RL")]
    Rl,
    /// Spine (base).
    #[serde(rename = "SP")]
    Sp,
    /// Spine 1.
    #[serde(rename = "SP1")]
    Sp1,
    /// Spine 2.
    #[serde(rename = "SP2")]
    Sp2,
    /// Head.
    #[serde(rename = "H")]
    H,
}

impl JointLabel {
    /// Every known label, in wire order.
    pub const ALL: [JointLabel; 12] = [
        JointLabel::Rfa,
        JointLabel::Ra,
        JointLabel::La,
        JointLabel::Lfa,
        JointLabel::Lul,
        JointLabel::Ll,
        JointLabel::Rul,
        JointLabel::Rl,
        JointLabel::Sp,
        JointLabel::Sp1,
        JointLabel::Sp2,
        JointLabel::H,
    ];

    /// The short code used on the wire and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            JointLabel::Rfa => "RFA",
            JointLabel::Ra => "RA",
            JointLabel::La => "LA",
            JointLabel::Lfa => "LFA",
            JointLabel::Lul => "LUL",
            JointLabel::Ll => "LL",
            JointLabel::Rul => "RUL",
            JointLabel::Rl => "RL",
            JointLabel::Sp => "SP",
            JointLabel::Sp1 => "SP1",
            JointLabel::Sp2 => "SP2",
            JointLabel::H => "H",
        }
    }
}

impl fmt::Display for JointLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown joint label {0:?}")]
pub struct ParseLabelError(pub String);

impl FromStr for JointLabel {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JointLabel::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| ParseLabelError(s.to_string()))
    }
}

/// Calibration status notice a sensor can send back after a `calibrate`
/// command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusToken {
    /// Gyro-bias ("hold still") phase finished on the sensor.
    Still,
    /// T-pose capture finished on the sensor.
    TPose,
}

impl StatusToken {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "Still" => Some(StatusToken::Still),
            "T-Pose" => Some(StatusToken::TPose),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            StatusToken::Still => "Still",
            StatusToken::TPose => "T-Pose",
        }
    }
}

impl fmt::Display for StatusToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}
