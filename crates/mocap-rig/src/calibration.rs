use crate::labels::{JointLabel, StatusToken};
use glam::{Quat, Vec4};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Externally visible calibration phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No calibration run yet: raw orientations pass through.
    Idle,
    /// Sample window open: samples are buffered, nothing is applied.
    Collecting,
    /// References stored: samples are retargeted against them.
    Calibrated,
}

enum State {
    Idle,
    Collecting {
        deadline: Instant,
        buffers: HashMap<JointLabel, Vec<Quat>>,
        tally: HashMap<StatusToken, HashSet<JointLabel>>,
    },
    Calibrated {
        references: HashMap<JointLabel, Quat>,
    },
}

/// T-pose calibration state machine.
///
/// A `calibrate` command opens a fixed collection window for the labels
/// connected at that moment. Raw samples are buffered per label until the
/// window elapses; each label's buffer is then reduced to a normalized
/// mean reference orientation. The window closes on time alone — a label
/// that sent nothing simply ends up without a reference.
///
/// Time is passed in explicitly (`begin`/`tick`) so the window can be
/// driven by a real timer in production and by virtual time in tests.
pub struct CalibrationEngine {
    window: Duration,
    state: State,
}

impl CalibrationEngine {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: State::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Collecting { .. } => Phase::Collecting,
            State::Calibrated { .. } => Phase::Calibrated,
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.phase() == Phase::Collecting
    }

    pub fn is_calibrated(&self) -> bool {
        self.phase() == Phase::Calibrated
    }

    /// When the current collection window ends, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            State::Collecting { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// Open a collection window for `labels`. Returns whether a new window
    /// was opened.
    ///
    /// A `calibrate` command while a window is already open is ignored;
    /// from `Calibrated` a new run starts and will overwrite the stored
    /// references.
    pub fn begin<I>(&mut self, labels: I, now: Instant) -> bool
    where
        I: IntoIterator<Item = JointLabel>,
    {
        if self.is_collecting() {
            tracing::warn!("calibrate command ignored: collection window already open");
            return false;
        }

        let buffers: HashMap<JointLabel, Vec<Quat>> =
            labels.into_iter().map(|label| (label, Vec::new())).collect();

        tracing::info!(
            labels = buffers.len(),
            window = ?self.window,
            "calibration window opened"
        );
        self.state = State::Collecting {
            deadline: now + self.window,
            buffers,
            tally: HashMap::new(),
        };
        true
    }

    /// Buffer a raw (unnormalized) sample while the window is open.
    ///
    /// Returns whether the sample was buffered. `false` means either no
    /// window is open, or the label was not connected when the window
    /// opened and has no buffer.
    pub fn push_sample(&mut self, label: JointLabel, raw: Quat) -> bool {
        let State::Collecting { buffers, .. } = &mut self.state else {
            return false;
        };
        match buffers.get_mut(&label) {
            Some(buffer) => {
                buffer.push(raw);
                true
            }
            None => {
                tracing::debug!(%label, "sample for label outside the calibration run dropped");
                false
            }
        }
    }

    /// Record a calibration status reply from one sensor.
    ///
    /// Tallied per run against the label set the window opened with;
    /// returns `true` when `label` completes the tally for `token` (every
    /// expected label has now replied with it).
    pub fn record_status(&mut self, label: JointLabel, token: StatusToken) -> bool {
        let State::Collecting { buffers, tally, .. } = &mut self.state else {
            tracing::debug!(%label, %token, "status notice outside a calibration run");
            return false;
        };
        if !buffers.contains_key(&label) {
            tracing::debug!(%label, %token, "status notice from label outside the run");
            return false;
        }

        let replied = tally.entry(token).or_default();
        replied.insert(label);
        if replied.len() == buffers.len() {
            tracing::info!(%token, sensors = buffers.len(), "all sensors reported calibration status");
            true
        } else {
            false
        }
    }

    /// Close the window if its deadline has passed. Returns whether the
    /// engine transitioned to `Calibrated`.
    ///
    /// The transition is unconditional on sample counts: labels with at
    /// least one sample get a reference, the rest are left uncalibrated.
    pub fn tick(&mut self, now: Instant) -> bool {
        let State::Collecting { deadline, buffers, .. } = &mut self.state else {
            return false;
        };
        if now < *deadline {
            return false;
        }

        let mut references = HashMap::new();
        for (label, samples) in buffers.drain() {
            if samples.is_empty() {
                tracing::warn!(%label, "no samples during calibration window; label left uncalibrated");
                continue;
            }
            let reference = mean_orientation(&samples);
            tracing::debug!(%label, samples = samples.len(), "reference orientation stored");
            references.insert(label, reference);
        }

        tracing::info!(references = references.len(), "calibration complete");
        self.state = State::Calibrated { references };
        true
    }

    /// The stored reference orientation for `label`, if it calibrated.
    pub fn reference(&self, label: JointLabel) -> Option<Quat> {
        match &self.state {
            State::Calibrated { references } => references.get(&label).copied(),
            _ => None,
        }
    }
}

/// Componentwise arithmetic mean of raw quaternion samples, normalized to
/// unit magnitude. A degenerate (zero-length) mean is returned raw rather
/// than divided by zero.
fn mean_orientation(samples: &[Quat]) -> Quat {
    let n = samples.len() as f32;
    let mut w = 0.0f32;
    let mut x = 0.0f32;
    let mut y = 0.0f32;
    let mut z = 0.0f32;
    for q in samples {
        w += q.w;
        x += q.x;
        y += q.y;
        z += q.z;
    }
    let mean = Quat::from_xyzw(x / n, y / n, z / n, w / n);
    Vec4::from(mean)
        .try_normalize()
        .map(Quat::from_vec4)
        .unwrap_or(mean)
}
