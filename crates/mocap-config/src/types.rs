use mocap_rig::JointLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sensor endpoints: one wearable per label.
    pub sensors: SensorConfig,
    /// Skeleton binding table.
    pub rig: RigConfig,
    /// Calibration window.
    pub calibration: CalibrationConfig,
    /// Reconnect policy for dropped sensor connections.
    pub reconnect: ReconnectConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sensors: SensorConfig::default(),
            rig: RigConfig::default(),
            calibration: CalibrationConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// `label -> host:port` of the wearable's text-frame endpoint.
    pub endpoints: BTreeMap<JointLabel, String>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        let endpoints = [
            (JointLabel::Rfa, "10.148.16.90:81"),
            (JointLabel::Ra, "10.148.16.85:81"),
        ]
        .into_iter()
        .map(|(label, addr)| (label, addr.to_string()))
        .collect();
        Self { endpoints }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    /// `label -> skeleton joint name`, matched exactly at bind time.
    pub bindings: BTreeMap<JointLabel, String>,
}

impl Default for RigConfig {
    fn default() -> Self {
        let bindings = [
            (JointLabel::Rfa, "mixamorigRightForeArm"),
            (JointLabel::Ra, "mixamorigRightArm"),
            (JointLabel::La, "mixamorigLeftArm"),
            (JointLabel::Lfa, "mixamorigLeftForeArm"),
            (JointLabel::Lul, "mixamorigLeftUpLeg"),
            (JointLabel::Ll, "mixamorigLeftLeg"),
            (JointLabel::Rul, "mixamorigRightUpLeg"),
            (JointLabel::Rl, "mixamorigRightLeg"),
            (JointLabel::Sp, "mixamorigSpine"),
            (JointLabel::Sp1, "mixamorigSpine1"),
            (JointLabel::Sp2, "mixamorigSpine2"),
            (JointLabel::H, "mixamorigHead"),
        ]
        .into_iter()
        .map(|(label, joint)| (label, joint.to_string()))
        .collect();
        Self { bindings }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Length of the sample-collection window in seconds.
    pub window_secs: u64,
}

impl CalibrationConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { window_secs: 30 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Whether dropped sessions are redialed at all.
    pub enabled: bool,
    /// Backoff before the first retry; doubles per attempt.
    pub initial_backoff_ms: u64,
    /// Cap on the backoff delay.
    pub max_backoff_ms: u64,
    /// Retries per outage before the session gives up until the next
    /// connect command.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: 3000,
            max_backoff_ms: 30_000,
            max_retries: 5,
        }
    }
}
