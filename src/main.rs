use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, Level};

use grimfell_sync_server::config::SyncConfig;
use grimfell_sync_server::game::constants::timing::TICK_DURATION_MS;
use grimfell_sync_server::game::movement::action;
use grimfell_sync_server::metrics::{start_metrics_server, SyncMetrics};
use grimfell_sync_server::net::snapshot::InputFrame;
use grimfell_sync_server::server::SyncServer;
use grimfell_sync_server::util::fixed::FixedVec3;
use grimfell_sync_server::util::vec3::Vec3;

/// Headless soak run: scripted movers exercising the full sync pipeline
/// (input ingestion, rewind history, delta encoding, corrections) so the
/// metrics endpoint shows realistic load without any client attached.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Grimfell sync server v{}", env!("CARGO_PKG_VERSION"));

    let config = SyncConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration: tick_rate={}Hz, snapshot_rate={}Hz, max_rewind={}ms, soak_entities={}",
        config.tick_rate, config.snapshot_rate, config.max_rewind_ms, config.soak_entities
    );

    let metrics = Arc::new(SyncMetrics::new());
    let metrics_clone = Arc::clone(&metrics);
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let mut server = SyncServer::new(&config, Arc::clone(&metrics));
    let sender = server.input_sender();

    // Scripted connections walking circles around the origin
    let mut movers = Vec::with_capacity(config.soak_entities);
    for i in 0..config.soak_entities {
        let angle = i as f32 / config.soak_entities as f32 * std::f32::consts::TAU;
        let spawn = Vec3::new(angle.cos() * 20.0, 0.0, angle.sin() * 20.0);
        let connection = uuid::Uuid::new_v4();
        let entity = server.connect(connection, FixedVec3::from_vec3(spawn));
        server.update_rtt(connection, 40 + (i as u32 % 5) * 30);
        movers.push((connection, entity, angle));
    }
    info!("Spawned {} scripted movers", movers.len());

    let start = Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(TICK_DURATION_MS));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut sequence: u32 = 0;

    info!("Tick loop running, Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now_ms = start.elapsed().as_millis() as u32;
                let tick_started = Instant::now();
                sequence += 1;

                for (_, entity, angle) in &movers {
                    // Walk tangentially, swing occasionally
                    let yaw = angle + now_ms as f32 / 3000.0;
                    let flags = if sequence % 97 == 0 {
                        action::FORWARD | action::ATTACK
                    } else {
                        action::FORWARD
                    };
                    let frame = InputFrame {
                        flags,
                        yaw,
                        pitch: 0.0,
                        sequence,
                        timestamp_ms: now_ms.saturating_sub(40),
                    };
                    if sender.try_send(*entity, frame).is_err() {
                        metrics.inputs_dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                }

                server.tick(now_ms);

                if server.is_snapshot_tick() {
                    let outbound = server.broadcast_snapshots();
                    // Self-ack: the soak run plays both ends of the wire
                    let server_tick = server.world().tick as u32;
                    for snapshot in &outbound {
                        if snapshot.result.is_ok() {
                            server.acknowledge_snapshot(snapshot.recipient, server_tick);
                        }
                    }
                    let corrections = server.corrections();
                    metrics.corrections_sent.fetch_add(
                        corrections.len() as u64,
                        std::sync::atomic::Ordering::Relaxed,
                    );
                }

                metrics.record_tick_time(tick_started.elapsed());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!(
        "Stopped after {} ticks, {} entities",
        server.world().tick,
        server.world().len()
    );
    Ok(())
}
