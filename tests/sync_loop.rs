//! End-to-end exercises of the sync pipeline: encoded inputs in, encoded
//! snapshots and corrections out, a client predictor reconciling against
//! them under simulated latency.

use std::sync::Arc;

use uuid::Uuid;

use grimfell_sync_server::config::SyncConfig;
use grimfell_sync_server::game::constants::timing::DT;
use grimfell_sync_server::game::movement::{action, MoveState};
use grimfell_sync_server::metrics::SyncMetrics;
use grimfell_sync_server::net::snapshot::{
    decode_correction, decode_snapshot, encode_correction, encode_input, EntityState, InputFrame,
};
use grimfell_sync_server::predict::predictor::{ClientPredictor, CorrectionOutcome};
use grimfell_sync_server::server::SyncServer;
use grimfell_sync_server::util::fixed::FixedVec3;
use grimfell_sync_server::util::vec3::Vec3;

fn new_server() -> SyncServer {
    SyncServer::new(&SyncConfig::default(), Arc::new(SyncMetrics::new()))
}

/// A client predicts forward movement, its inputs travel the wire, and the
/// server's corrections confirm the shared movement step kept both sides
/// in agreement.
#[test]
fn client_prediction_matches_server_simulation() {
    let mut server = new_server();
    let connection = Uuid::new_v4();
    let entity = server.connect(connection, FixedVec3::ZERO);

    let mut predictor = ClientPredictor::new(MoveState::default());

    for tick in 1..=60u32 {
        let now_ms = tick * 16;
        let input = grimfell_sync_server::game::movement::MoveInput {
            flags: action::FORWARD,
            yaw: 0.5,
            pitch: 0.0,
        };
        let sequence = predictor.predict(input, now_ms, DT);

        // Round-trip the input through its wire encoding
        let frame = InputFrame {
            flags: input.flags,
            yaw: input.yaw,
            pitch: input.pitch,
            sequence,
            timestamp_ms: now_ms,
        };
        let bytes = encode_input(&frame).unwrap();
        assert!(server.ingest_input(entity, &bytes));

        server.tick(now_ms);
    }

    // Correction round-trips the wire too
    let corrections = server.corrections();
    let bytes = encode_correction(&corrections[0].1).unwrap();
    let correction = decode_correction(&bytes).unwrap();
    assert_eq!(correction.last_processed_sequence, 60);

    let outcome = predictor.apply_correction(&correction);
    // Divergence stays within input quantization plus wire quantization
    assert_eq!(outcome, CorrectionOutcome::InSync);

    let server_pos = server.world().get(entity).unwrap().position.to_vec3();
    let client_pos = predictor.state().position;
    assert!(server_pos.distance_to(client_pos) < 0.1);
}

/// Snapshots delta against each recipient's own acknowledged baseline and
/// carry despawns in the removed list.
#[test]
fn snapshot_stream_tracks_world_changes() {
    let mut server = new_server();
    let viewer = Uuid::new_v4();
    let other = Uuid::new_v4();
    server.connect(viewer, FixedVec3::from_vec3(Vec3::new(0.0, 0.0, 0.0)));
    let other_entity = server.connect(other, FixedVec3::from_vec3(Vec3::new(10.0, 0.0, 0.0)));

    server.tick(16);
    server.tick(32);
    server.tick(48);

    // First snapshot: full state for everyone
    let outbound = server.broadcast_snapshots();
    let first_tick = server.world().tick as u32;
    let viewer_bytes = outbound
        .iter()
        .find(|s| s.recipient == viewer)
        .unwrap()
        .result
        .as_ref()
        .unwrap()
        .0
        .clone();
    let decoded = decode_snapshot(&viewer_bytes).unwrap();
    assert_eq!(decoded.entities.len(), 2);
    assert!(decoded.entities.iter().all(|e| e.is_new_entity()));

    // The viewer reconstructs known state by applying masked fields
    let mut known: Vec<EntityState> = Vec::new();
    for update in &decoded.entities {
        let mut state = EntityState {
            id: update.id,
            entity_type: 0,
            position: FixedVec3::ZERO,
            velocity: FixedVec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            health_percent: 0,
            anim_state: 0,
        };
        update.apply_to(&mut state);
        known.push(state);
    }
    assert!(known.iter().all(|s| s.health_percent == 100));

    server.acknowledge_snapshot(viewer, first_tick);

    // The other player disconnects; the next delta reports the removal
    server.disconnect(other);
    server.tick(64);
    server.tick(80);
    server.tick(96);

    let outbound = server.broadcast_snapshots();
    let viewer_bytes = &outbound
        .iter()
        .find(|s| s.recipient == viewer)
        .unwrap()
        .result
        .as_ref()
        .unwrap()
        .0;
    let decoded = decode_snapshot(viewer_bytes).unwrap();
    assert_eq!(decoded.baseline_tick, first_tick);
    assert_eq!(decoded.removed, vec![other_entity]);
}

/// A laggy attacker's swing is validated where the target stood at the
/// attack time, end to end through the server tick path.
#[test]
fn lag_compensated_hit_through_server_loop() {
    let mut server = new_server();
    let attacker_conn = Uuid::new_v4();
    let runner_conn = Uuid::new_v4();
    let attacker = server.connect(attacker_conn, FixedVec3::ZERO);
    let runner = server.connect(
        runner_conn,
        FixedVec3::from_vec3(Vec3::new(0.0, 0.0, 2.0)),
    );
    server.update_rtt(attacker_conn, 200);
    let sender = server.input_sender();

    // The runner sprints away while the attacker's swing is in flight
    let mut now_ms = 0;
    for tick in 1..=40u32 {
        now_ms = tick * 16;
        sender
            .try_send(
                runner,
                InputFrame {
                    flags: action::FORWARD | action::SPRINT,
                    yaw: 0.0,
                    pitch: 0.0,
                    sequence: tick,
                    timestamp_ms: now_ms,
                },
            )
            .unwrap();
        server.tick(now_ms);
    }

    // Swing reported now but performed early in the chase; with half the
    // RTT added back the attack resolves at t=200ms, when the runner was
    // still inside melee range
    sender
        .try_send(
            attacker,
            InputFrame {
                flags: action::ATTACK,
                yaw: 0.0,
                pitch: 0.0,
                sequence: 1,
                timestamp_ms: 100,
            },
        )
        .unwrap();
    let events = server.tick(now_ms + 16);

    assert_eq!(events.len(), 1);
    let (who, result) = &events[0];
    assert_eq!(*who, attacker);
    assert!(result.hit);
    assert_eq!(result.target, Some(runner));
    // Damage landed on the runner's present health
    assert!(server.world().get(runner).unwrap().health < 10_000);
}
