//! Per-sensor session lifecycle.
//!
//! [`SessionHub`] owns one independent task per configured endpoint. Each
//! task dials its sensor, decodes inbound frames, and pushes typed
//! [`SessionEvent`]s into a single ordered channel that the dispatch loop
//! consumes. Frames from one sensor keep their arrival order; frames from
//! different sensors interleave arbitrarily. One sensor failing never
//! touches the others.

use crate::protocol::{self, SensorEvent};
use crate::transport::{Connection, Dialer, LinkEvent};
use mocap_config::ReconnectConfig;
use mocap_rig::JointLabel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Command token that tells a sensor to start streaming samples.
pub const CMD_START: &str = "start";
/// Command token that tells a sensor to run its calibration routine.
pub const CMD_CALIBRATE: &str = "calibrate";

/// Lifecycle and data events for the dispatch loop.
#[derive(Debug)]
pub enum SessionEvent {
    Opened { label: JointLabel },
    Frame { label: JointLabel, event: SensorEvent },
    Closed { label: JointLabel },
    Error { label: JointLabel, error: String },
}

struct SessionSlot {
    label: JointLabel,
    addr: String,
    outbound: mpsc::UnboundedSender<String>,
    /// Taken by the session task when it spawns.
    inbound: Option<mpsc::UnboundedReceiver<String>>,
    open: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

/// Owns every sensor session and the shared event channel.
pub struct SessionHub {
    slots: Vec<SessionSlot>,
    dialer: Arc<dyn Dialer>,
    reconnect: ReconnectConfig,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHub {
    /// Build a hub for the configured endpoints. The returned receiver is
    /// the single consumer of all session events.
    pub fn new(
        endpoints: Vec<(JointLabel, String)>,
        dialer: Arc<dyn Dialer>,
        reconnect: ReconnectConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let slots = endpoints
            .into_iter()
            .map(|(label, addr)| {
                let (outbound, inbound) = mpsc::unbounded_channel();
                SessionSlot {
                    label,
                    addr,
                    outbound,
                    inbound: Some(inbound),
                    open: Arc::new(AtomicBool::new(false)),
                    task: None,
                }
            })
            .collect();

        (
            Self {
                slots,
                dialer,
                reconnect,
                events_tx,
            },
            events_rx,
        )
    }

    /// Open one connection per configured endpoint, fire-and-forget.
    ///
    /// Each endpoint gets its own task; a sensor that cannot be reached
    /// reports an error event and never blocks the others. Endpoints whose
    /// task is still running are left alone, so a repeated connect command
    /// only revives dead sessions.
    pub fn connect_all(&mut self) {
        for slot in &mut self.slots {
            let running = slot.task.as_ref().map_or(false, |task| !task.is_finished());
            if running {
                tracing::debug!(label = %slot.label, "session already running");
                continue;
            }

            // A finished task consumed the old command receiver; make a
            // fresh pair so broadcasts reach the new session.
            let inbound = match slot.inbound.take() {
                Some(inbound) => inbound,
                None => {
                    let (outbound, inbound) = mpsc::unbounded_channel();
                    slot.outbound = outbound;
                    inbound
                }
            };

            tracing::info!(label = %slot.label, addr = %slot.addr, "connecting sensor");
            slot.task = Some(tokio::spawn(session_task(
                slot.label,
                slot.addr.clone(),
                Arc::clone(&self.dialer),
                self.reconnect,
                Arc::clone(&slot.open),
                inbound,
                self.events_tx.clone(),
            )));
        }
    }

    /// Send a command token to every currently-open session.
    ///
    /// Sessions that are not open are skipped; no acknowledgment is
    /// awaited.
    pub fn broadcast(&self, command: &str) {
        for slot in &self.slots {
            if !slot.open.load(Ordering::SeqCst) {
                continue;
            }
            if slot.outbound.send(command.to_string()).is_err() {
                tracing::debug!(label = %slot.label, "session task gone; command dropped");
            }
        }
    }

    /// Labels with an open connection right now.
    pub fn connected_labels(&self) -> Vec<JointLabel> {
        self.slots
            .iter()
            .filter(|slot| slot.open.load(Ordering::SeqCst))
            .map(|slot| slot.label)
            .collect()
    }
}

enum SessionEnd {
    Closed,
    Error(String),
    /// The hub or dispatch loop went away; do not reconnect.
    Shutdown,
}

/// One sensor's connect/reconnect loop.
async fn session_task(
    label: JointLabel,
    addr: String,
    dialer: Arc<dyn Dialer>,
    policy: ReconnectConfig,
    open: Arc<AtomicBool>,
    mut commands: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut attempt: u32 = 0;
    loop {
        match dialer.dial(addr.clone()).await {
            Ok(conn) => {
                attempt = 0;
                open.store(true, Ordering::SeqCst);
                if events_tx.send(SessionEvent::Opened { label }).is_err() {
                    return;
                }
                tracing::info!(%label, %addr, "sensor connected");

                let end = run_session(conn, &mut commands, label, &events_tx).await;
                open.store(false, Ordering::SeqCst);
                match end {
                    SessionEnd::Closed => {
                        tracing::warn!(%label, "sensor connection closed");
                        let _ = events_tx.send(SessionEvent::Closed { label });
                    }
                    SessionEnd::Error(error) => {
                        tracing::error!(%label, %error, "sensor connection failed");
                        let _ = events_tx.send(SessionEvent::Error { label, error });
                    }
                    SessionEnd::Shutdown => return,
                }
            }
            Err(e) => {
                tracing::error!(%label, %addr, error = %e, "failed to connect sensor");
                let _ = events_tx.send(SessionEvent::Error {
                    label,
                    error: e.to_string(),
                });
            }
        }

        if !policy.enabled {
            break;
        }
        if attempt >= policy.max_retries {
            tracing::warn!(%label, retries = attempt, "giving up until the next connect command");
            break;
        }
        let delay = backoff_delay(&policy, attempt);
        tracing::info!(%label, attempt, ?delay, "redialing after backoff");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Pump one open connection until it ends.
async fn run_session(
    mut conn: Connection,
    commands: &mut mpsc::UnboundedReceiver<String>,
    label: JointLabel,
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
) -> SessionEnd {
    loop {
        tokio::select! {
            inbound = conn.events.recv() => match inbound {
                Some(LinkEvent::Frame(text)) => match protocol::decode(&text) {
                    Ok(event) => {
                        if events_tx.send(SessionEvent::Frame { label, event }).is_err() {
                            return SessionEnd::Shutdown;
                        }
                    }
                    // Malformed frames are dropped here; the session and
                    // the process keep going.
                    Err(e) => tracing::debug!(%label, error = %e, "dropping malformed frame"),
                },
                Some(LinkEvent::Closed) | None => return SessionEnd::Closed,
                Some(LinkEvent::Error(error)) => return SessionEnd::Error(error),
            },
            outbound = commands.recv() => match outbound {
                Some(command) => {
                    if conn.commands.send(command).is_err() {
                        return SessionEnd::Closed;
                    }
                }
                None => return SessionEnd::Shutdown,
            },
        }
    }
}

/// Exponential backoff: `initial * 2^attempt`, capped.
fn backoff_delay(policy: &ReconnectConfig, attempt: u32) -> Duration {
    let exp = policy
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(exp.min(policy.max_backoff_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockDialer;
    use mocap_rig::StatusToken;

    fn no_reconnect() -> ReconnectConfig {
        ReconnectConfig {
            enabled: false,
            ..ReconnectConfig::default()
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn connect_all_opens_each_registered_endpoint() {
        let dialer = Arc::new(MockDialer::new());
        let _ra = dialer.add_peer("10.0.0.1:81");
        let _la = dialer.add_peer("10.0.0.2:81");

        let (mut hub, mut events) = SessionHub::new(
            vec![
                (JointLabel::Ra, "10.0.0.1:81".to_string()),
                (JointLabel::La, "10.0.0.2:81".to_string()),
            ],
            dialer,
            no_reconnect(),
        );
        hub.connect_all();

        let mut opened = Vec::new();
        for _ in 0..2 {
            match next_event(&mut events).await {
                SessionEvent::Opened { label } => opened.push(label),
                other => panic!("expected Opened, got {other:?}"),
            }
        }
        opened.sort();
        assert_eq!(opened, vec![JointLabel::Ra, JointLabel::La]);
        assert_eq!(hub.connected_labels().len(), 2);
    }

    #[tokio::test]
    async fn one_failed_dial_does_not_block_the_other_session() {
        let dialer = Arc::new(MockDialer::new());
        let _ra = dialer.add_peer("10.0.0.1:81");
        // No peer registered for LA: its dial is refused.

        let (mut hub, mut events) = SessionHub::new(
            vec![
                (JointLabel::Ra, "10.0.0.1:81".to_string()),
                (JointLabel::La, "10.0.0.9:81".to_string()),
            ],
            dialer,
            no_reconnect(),
        );
        hub.connect_all();

        let mut saw_open = false;
        let mut saw_error = false;
        for _ in 0..2 {
            match next_event(&mut events).await {
                SessionEvent::Opened { label } => {
                    assert_eq!(label, JointLabel::Ra);
                    saw_open = true;
                }
                SessionEvent::Error { label, .. } => {
                    assert_eq!(label, JointLabel::La);
                    saw_error = true;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(saw_open && saw_error);
        assert_eq!(hub.connected_labels(), vec![JointLabel::Ra]);
    }

    #[tokio::test]
    async fn broadcast_reaches_only_open_sessions() {
        let dialer = Arc::new(MockDialer::new());
        let mut peer = dialer.add_peer("10.0.0.1:81");

        let (mut hub, mut events) = SessionHub::new(
            vec![
                (JointLabel::Ra, "10.0.0.1:81".to_string()),
                (JointLabel::La, "10.0.0.9:81".to_string()),
            ],
            dialer,
            no_reconnect(),
        );

        // Nothing is open yet: the broadcast is a no-op everywhere.
        hub.broadcast(CMD_START);

        hub.connect_all();
        for _ in 0..2 {
            next_event(&mut events).await;
        }

        hub.broadcast(CMD_CALIBRATE);
        let received = tokio::time::timeout(Duration::from_secs(1), peer.commands.recv())
            .await
            .expect("timed out waiting for command")
            .expect("peer channel closed");
        assert_eq!(received, CMD_CALIBRATE);
    }

    #[tokio::test]
    async fn frames_are_decoded_and_malformed_ones_dropped() {
        let dialer = Arc::new(MockDialer::new());
        let peer = dialer.add_peer("10.0.0.1:81");

        let (mut hub, mut events) = SessionHub::new(
            vec![(JointLabel::Ra, "10.0.0.1:81".to_string())],
            dialer,
            no_reconnect(),
        );
        hub.connect_all();
        assert!(matches!(next_event(&mut events).await, SessionEvent::Opened { .. }));

        peer.events
            .send(LinkEvent::Frame("garbage".to_string()))
            .unwrap();
        peer.events
            .send(LinkEvent::Frame(r#"{"msg": "Still"}"#.to_string()))
            .unwrap();

        // Only the valid frame comes through, in order.
        match next_event(&mut events).await {
            SessionEvent::Frame { label, event } => {
                assert_eq!(label, JointLabel::Ra);
                assert_eq!(event, SensorEvent::Status(StatusToken::Still));
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn peer_close_ends_the_session() {
        let dialer = Arc::new(MockDialer::new());
        let peer = dialer.add_peer("10.0.0.1:81");

        let (mut hub, mut events) = SessionHub::new(
            vec![(JointLabel::Ra, "10.0.0.1:81".to_string())],
            dialer,
            no_reconnect(),
        );
        hub.connect_all();
        assert!(matches!(next_event(&mut events).await, SessionEvent::Opened { .. }));

        peer.events.send(LinkEvent::Closed).unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::Closed { label: JointLabel::Ra }
        ));
        assert!(hub.connected_labels().is_empty());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectConfig {
            enabled: true,
            initial_backoff_ms: 3000,
            max_backoff_ms: 30_000,
            max_retries: 10,
        };
        assert_eq!(backoff_delay(&policy, 0), Duration::from_millis(3000));
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(6000));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(12_000));
        assert_eq!(backoff_delay(&policy, 4), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(&policy, 32), Duration::from_millis(30_000));
    }
}
