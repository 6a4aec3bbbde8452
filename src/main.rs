use anyhow::Result;
use mocap_app::{ControlCommand, PoseService};
use mocap_config::AppConfig;
use mocap_rig::{BoneMap, CalibrationEngine, PoseBuffer, Retargeter};
use mocap_sensor::{SessionHub, WsDialer};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mocap_app=info,mocap_sensor=info,mocap_rig=info".into()),
        )
        .init();

    info!("Wearable motion-capture service starting");

    // Load config.
    let config = mocap_config::load_config().unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    info!(
        sensors = config.sensors.endpoints.len(),
        bindings = config.rig.bindings.len(),
        "Config loaded"
    );

    // The pose buffer's joint set is the binding table's right-hand side;
    // a renderer-backed skeleton would supply its own names here.
    let joints: Vec<String> = config.rig.bindings.values().cloned().collect();
    let bones = BoneMap::resolve(&config.rig.bindings, &joints);
    let skeleton = PoseBuffer::new(joints);

    let endpoints: Vec<_> = config
        .sensors
        .endpoints
        .iter()
        .map(|(label, addr)| (*label, addr.clone()))
        .collect();
    let (hub, events) = SessionHub::new(endpoints, Arc::new(WsDialer), config.reconnect);

    let mut service = PoseService::new(
        hub,
        CalibrationEngine::new(config.calibration.window()),
        Retargeter::new(bones),
        skeleton,
    );

    // Operator console: one command per stdin line.
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "connect" => ControlCommand::ConnectAll,
                "start" => ControlCommand::StartStreaming,
                "calibrate" => ControlCommand::BeginCalibration,
                "quit" | "exit" => break,
                "" => continue,
                other => {
                    warn!(command = other, "Unknown command (connect | start | calibrate | quit)");
                    continue;
                }
            };
            if command_tx.send(command).is_err() {
                break;
            }
        }
        // Dropping the sender stops the service loop.
    });

    service.run(events, command_rx).await;

    info!("Shutting down");
    Ok(())
}
