//! Tick orchestration: inputs in, snapshots and corrections out
//!
//! `SyncServer` owns the authoritative world and wires the subsystems
//! together. Each tick it drains the input buffer, advances movement
//! through the shared step, validates attacks against position history,
//! and records the post-tick poses. On snapshot ticks it produces one
//! delta per connection plus an authoritative correction for each
//! connection's own entity.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::combat::history::LagCompensator;
use crate::combat::rewind::{AttackClaim, AttackKind, LagCompensatedCombat};
use crate::combat::system::{CombatConfig, CombatSystem, HitResult};
use crate::config::SyncConfig;
use crate::game::constants::timing::{DT, TICKS_PER_SNAPSHOT};
use crate::game::input_buffer::{InputBuffer, InputSender};
use crate::game::movement::{action, step};
use crate::game::state::{EntityId, EntityType, WorldState};
use crate::metrics::SyncMetrics;
use crate::net::baseline::{BaselineStore, OutboundSnapshot};
use crate::net::snapshot::{decode_input, Correction, EntityState, InputFrame};
use crate::util::fixed::FixedVec3;

/// Per-connection bookkeeping
#[derive(Debug, Clone, Copy)]
struct ConnectionState {
    entity: EntityId,
    /// Smoothed RTT from the ping channel
    rtt_ms: u32,
    /// Highest input sequence applied to the simulation
    last_processed_sequence: u32,
}

/// The authoritative synchronization core
pub struct SyncServer {
    world: WorldState,
    compensator: Arc<LagCompensator>,
    combat: LagCompensatedCombat,
    inputs: InputBuffer,
    baselines: BaselineStore,
    connections: FxHashMap<Uuid, ConnectionState>,
    metrics: Arc<SyncMetrics>,
    rng: StdRng,
}

impl SyncServer {
    pub fn new(config: &SyncConfig, metrics: Arc<SyncMetrics>) -> Self {
        let compensator = Arc::new(LagCompensator::new());
        let combat = LagCompensatedCombat::new(
            CombatSystem::new(CombatConfig::default()),
            Arc::clone(&compensator),
            Arc::clone(&metrics),
        );
        Self {
            world: WorldState::new(),
            compensator,
            combat,
            inputs: InputBuffer::new(config.input_buffer_capacity),
            baselines: BaselineStore::new(),
            connections: FxHashMap::default(),
            metrics,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn compensator(&self) -> &Arc<LagCompensator> {
        &self.compensator
    }

    /// Sender handle for connection handlers
    pub fn input_sender(&self) -> InputSender {
        self.inputs.sender()
    }

    /// Decode a raw input packet and queue it for the next tick
    ///
    /// Returns false when the packet was dropped, either malformed or
    /// lost to buffer backpressure. Both cases are counted.
    pub fn ingest_input(&self, entity: EntityId, bytes: &[u8]) -> bool {
        let frame = match decode_input(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics
                    .decode_failures
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                debug!(entity, "dropping malformed input: {}", e);
                return false;
            }
        };
        if self.inputs.sender().try_send(entity, frame).is_err() {
            self.metrics
                .inputs_dropped
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Register a connection and spawn its player entity
    pub fn connect(&mut self, connection: Uuid, spawn_position: FixedVec3) -> EntityId {
        let entity = self.world.spawn(EntityType::Player, spawn_position);
        self.connections.insert(
            connection,
            ConnectionState {
                entity,
                rtt_ms: 0,
                last_processed_sequence: 0,
            },
        );
        self.baselines.add_recipient(connection);
        self.metrics
            .connections_active
            .store(self.connections.len() as u64, std::sync::atomic::Ordering::Relaxed);
        debug!(%connection, entity, "client connected");
        entity
    }

    /// Drop a connection and everything attached to it
    pub fn disconnect(&mut self, connection: Uuid) {
        if let Some(state) = self.connections.remove(&connection) {
            self.world.remove(state.entity);
            self.compensator.remove_entity(state.entity);
        }
        self.baselines.remove_recipient(connection);
        self.metrics
            .connections_active
            .store(self.connections.len() as u64, std::sync::atomic::Ordering::Relaxed);
        debug!(%connection, "client disconnected");
    }

    /// Update a connection's RTT estimate from the ping channel
    pub fn update_rtt(&mut self, connection: Uuid, rtt_ms: u32) {
        if let Some(state) = self.connections.get_mut(&connection) {
            state.rtt_ms = rtt_ms;
        }
    }

    pub fn acknowledge_snapshot(&mut self, connection: Uuid, tick: u32) -> bool {
        self.baselines.acknowledge(connection, tick)
    }

    fn connection_for_entity(&self, entity: EntityId) -> Option<(Uuid, ConnectionState)> {
        self.connections
            .iter()
            .find(|(_, s)| s.entity == entity)
            .map(|(id, s)| (*id, *s))
    }

    /// Advance the simulation by one tick
    ///
    /// Returns the combat results produced this tick so the caller can
    /// fan out notifications.
    pub fn tick(&mut self, now_ms: u32) -> Vec<(EntityId, HitResult)> {
        let mut combat_events = Vec::new();

        // Group this tick's inputs by entity, oldest first per entity.
        // The channel preserves per-sender order; sorting by sequence
        // guards against interleaving across reads.
        let mut by_entity: FxHashMap<EntityId, Vec<InputFrame>> = FxHashMap::default();
        for command in self.inputs.drain() {
            by_entity.entry(command.entity).or_default().push(command.frame);
        }

        for (entity_id, mut frames) in by_entity {
            frames.sort_by_key(|f| f.sequence);
            let (connection, mut conn_state) = match self.connection_for_entity(entity_id) {
                Some(found) => found,
                None => continue,
            };

            for frame in frames {
                // Replays and reordered duplicates are skipped
                if frame.sequence <= conn_state.last_processed_sequence {
                    self.metrics
                        .inputs_dropped
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    continue;
                }
                conn_state.last_processed_sequence = frame.sequence;

                let input = frame.to_move_input();
                let wants_attack = input.has(action::ATTACK);
                {
                    let entity = match self.world.get_mut(entity_id) {
                        Some(e) if e.alive => e,
                        _ => continue,
                    };
                    entity.yaw = input.yaw;
                    entity.pitch = input.pitch;
                    let next = step(entity.move_state(), &input, DT);
                    entity.apply_move_state(next);
                }
                self.metrics
                    .inputs_processed
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

                if wants_attack {
                    let claim = AttackClaim {
                        attacker: entity_id,
                        client_timestamp_ms: frame.timestamp_ms,
                        rtt_ms: conn_state.rtt_ms,
                        kind: AttackKind::Melee,
                        claimed: None,
                    };
                    let results =
                        self.combat
                            .process_attack(&mut self.world, &claim, now_ms, &mut self.rng);
                    for result in results {
                        combat_events.push((entity_id, result));
                    }
                }
            }

            if let Some(state) = self.connections.get_mut(&connection) {
                state.last_processed_sequence = conn_state.last_processed_sequence;
            }
        }

        self.world.tick += 1;
        self.compensator.record_world(&self.world, now_ms);
        self.metrics
            .entity_count
            .store(self.world.len() as u64, std::sync::atomic::Ordering::Relaxed);

        combat_events
    }

    /// True when this tick should broadcast snapshots
    pub fn is_snapshot_tick(&self) -> bool {
        self.world.tick % TICKS_PER_SNAPSHOT == 0
    }

    /// Replicated view of every entity, the snapshot input
    fn replicated_states(&self) -> Vec<EntityState> {
        self.world
            .entities
            .values()
            .map(EntityState::from_entity)
            .collect()
    }

    /// Encode this tick's snapshot for every connection
    pub fn broadcast_snapshots(&mut self) -> Vec<OutboundSnapshot> {
        let states = self.replicated_states();
        let server_tick = self.world.tick as u32;
        let outbound = self.baselines.encode_all(server_tick, &states);
        for snapshot in &outbound {
            match &snapshot.result {
                Ok((bytes, stats)) => {
                    self.metrics
                        .snapshots_encoded
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    self.metrics
                        .snapshot_bytes
                        .fetch_add(bytes.len() as u64, std::sync::atomic::Ordering::Relaxed);
                    self.metrics.entities_delta_skipped.fetch_add(
                        stats.entities_skipped as u64,
                        std::sync::atomic::Ordering::Relaxed,
                    );
                }
                Err(e) => {
                    warn!(recipient = %snapshot.recipient, "snapshot encode failed: {}", e);
                }
            }
        }
        outbound
    }

    /// Authoritative correction for each connection's own entity
    pub fn corrections(&self) -> Vec<(Uuid, Correction)> {
        let server_tick = self.world.tick as u32;
        self.connections
            .iter()
            .filter_map(|(connection, state)| {
                let entity = self.world.get(state.entity)?;
                Some((
                    *connection,
                    Correction {
                        server_tick,
                        position: entity.position,
                        velocity: entity.velocity,
                        last_processed_sequence: state.last_processed_sequence,
                    },
                ))
            })
            .collect()
    }
}
