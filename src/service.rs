//! Dispatch loop tying sessions, calibration, and retargeting together.
//!
//! All state lives here, single-threaded: session tasks and the control
//! surface talk to the service through channels only, so there is no
//! locking around the calibration engine or the skeleton.

use mocap_rig::{CalibrationEngine, Retargeter, Skeleton};
use mocap_sensor::{SensorEvent, SessionEvent, SessionHub, CMD_CALIBRATE, CMD_START};
use std::time::Instant;
use tokio::sync::mpsc;

/// Operator commands, fed through a channel rather than method calls so
/// any frontend (stdin, a UI, a test) can drive the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Dial every configured sensor.
    ConnectAll,
    /// Tell connected sensors to start streaming samples.
    StartStreaming,
    /// Open a calibration window for the sensors connected right now.
    BeginCalibration,
}

/// The pose pipeline: sensor frames in, skeleton orientations out.
pub struct PoseService<S: Skeleton> {
    hub: SessionHub,
    engine: CalibrationEngine,
    retargeter: Retargeter,
    skeleton: S,
}

impl<S: Skeleton> PoseService<S> {
    pub fn new(
        hub: SessionHub,
        engine: CalibrationEngine,
        retargeter: Retargeter,
        skeleton: S,
    ) -> Self {
        Self {
            hub,
            engine,
            retargeter,
            skeleton,
        }
    }

    pub fn skeleton(&self) -> &S {
        &self.skeleton
    }

    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    pub fn handle_command(&mut self, command: ControlCommand, now: Instant) {
        match command {
            ControlCommand::ConnectAll => self.hub.connect_all(),
            ControlCommand::StartStreaming => self.hub.broadcast(CMD_START),
            ControlCommand::BeginCalibration => {
                // The run covers the sensors connected at this moment;
                // late joiners wait for the next run.
                let labels = self.hub.connected_labels();
                if self.engine.begin(labels, now) {
                    self.hub.broadcast(CMD_CALIBRATE);
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened { label } => {
                tracing::info!(%label, "sensor session open");
            }
            SessionEvent::Closed { label } => {
                tracing::info!(%label, "sensor session closed");
            }
            SessionEvent::Error { label, error } => {
                tracing::warn!(%label, %error, "sensor session error");
            }
            SessionEvent::Frame { label, event } => self.handle_frame(label, event),
        }
    }

    fn handle_frame(&mut self, session: mocap_rig::JointLabel, event: SensorEvent) {
        match event {
            SensorEvent::Status(token) => {
                self.engine.record_status(session, token);
            }
            SensorEvent::Sample { label, orientation } => {
                // The frame's own label routes the sample; a sensor
                // relaying for another segment is unusual but legal.
                if label != session {
                    tracing::debug!(%session, %label, "sample label differs from session label");
                }
                if self.engine.is_collecting() {
                    self.engine.push_sample(label, orientation);
                } else {
                    self.retargeter
                        .apply(&self.engine, &mut self.skeleton, label, orientation);
                }
            }
        }
    }

    /// Advance the calibration clock. Returns whether a window closed.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.engine.tick(now)
    }

    /// Drive the service until both input channels close.
    pub async fn run(
        &mut self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut commands: mpsc::UnboundedReceiver<ControlCommand>,
    ) {
        loop {
            let window_close = self.engine.deadline();
            tokio::select! {
                _ = async {
                    match window_close {
                        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.tick(Instant::now());
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, Instant::now()),
                    None => break,
                },
            }
        }
        tracing::info!("pose service stopped");
    }
}
