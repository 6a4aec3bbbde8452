//! Wire protocol for the wearable sensors.
//!
//! Each sensor pushes JSON text frames with one of two mutually exclusive
//! shapes:
//!
//! - status notice: `{"msg": "Still"}` or `{"msg": "T-Pose"}`
//! - orientation sample: `{"label": "RA", "quaternion": [w, x, y, z]}`
//!
//! Anything else is dropped at this boundary: decoding returns a typed
//! error for the session loop to log, and never terminates the session.

use glam::Quat;
use mocap_rig::{JointLabel, StatusToken};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown status token {0:?}")]
    UnknownStatus(String),
    #[error("unknown joint label {0:?}")]
    UnknownLabel(String),
    #[error("quaternion must have exactly 4 elements, got {0}")]
    QuaternionArity(usize),
    #[error("frame matches neither status nor sample shape")]
    UnknownShape,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorEvent {
    /// Calibration status notice; the sending sensor is identified by its
    /// session, not by the frame.
    Status(StatusToken),
    /// One orientation sample.
    Sample {
        label: JointLabel,
        /// Raw orientation exactly as sent; not guaranteed normalized.
        orientation: Quat,
    },
}

/// Loose frame shape: both message kinds share one JSON object layout
/// with optional fields, mirroring what the firmware actually emits.
#[derive(Debug, Deserialize)]
struct RawFrame {
    msg: Option<String>,
    label: Option<String>,
    quaternion: Option<Vec<f64>>,
}

/// Decode one text frame.
pub fn decode(frame: &str) -> Result<SensorEvent, ProtocolError> {
    let raw: RawFrame = serde_json::from_str(frame)?;

    // Status frames win: the firmware never mixes the two shapes.
    if let Some(msg) = raw.msg {
        return StatusToken::from_wire(&msg)
            .map(SensorEvent::Status)
            .ok_or(ProtocolError::UnknownStatus(msg));
    }

    let (Some(label), Some(quaternion)) = (raw.label, raw.quaternion) else {
        return Err(ProtocolError::UnknownShape);
    };

    let label: JointLabel = label
        .parse()
        .map_err(|e: mocap_rig::labels::ParseLabelError| ProtocolError::UnknownLabel(e.0))?;

    if quaternion.len() != 4 {
        return Err(ProtocolError::QuaternionArity(quaternion.len()));
    }

    // Wire order is (w, x, y, z).
    let [w, x, y, z] = [quaternion[0], quaternion[1], quaternion[2], quaternion[3]];
    Ok(SensorEvent::Sample {
        label,
        orientation: Quat::from_xyzw(x as f32, y as f32, z as f32, w as f32),
    })
}
