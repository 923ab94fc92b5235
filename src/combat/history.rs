//! Per-entity position history for server-side rewind
//!
//! Every tick the server records each entity's pose. Hit validation asks
//! "where was this entity at time T" and gets a linearly interpolated
//! answer, or `None` when T falls outside the recorded window. Lookups
//! outside the window fail closed: no sample, no hit.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::game::constants::combat::{
    HISTORY_WINDOW_MS, HIT_CLAIM_TOLERANCE, MAX_HISTORY_SAMPLES,
};
use crate::game::state::{EntityId, WorldState};
use crate::util::fixed::FixedVec3;

/// One recorded pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    /// Server timestamp in milliseconds
    pub timestamp_ms: u32,
    pub position: FixedVec3,
    pub velocity: FixedVec3,
    pub yaw: f32,
    pub pitch: f32,
}

/// Time-ordered ring of pose samples for one entity
#[derive(Debug, Default)]
pub struct PositionHistory {
    samples: VecDeque<PoseSample>,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pose at a server timestamp
    ///
    /// Timestamps must be non-decreasing; an out-of-order sample is
    /// dropped rather than corrupting the binary-search invariant.
    /// Recording also prunes samples older than the retention window
    /// and enforces the sample cap.
    pub fn record(&mut self, sample: PoseSample) {
        if let Some(last) = self.samples.back() {
            if sample.timestamp_ms < last.timestamp_ms {
                return;
            }
        }
        self.samples.push_back(sample);

        let cutoff = sample.timestamp_ms.saturating_sub(HISTORY_WINDOW_MS);
        while let Some(front) = self.samples.front() {
            if front.timestamp_ms >= cutoff && self.samples.len() <= MAX_HISTORY_SAMPLES {
                break;
            }
            self.samples.pop_front();
        }
    }

    /// Interpolated pose at `timestamp_ms`, or `None` outside the window
    ///
    /// Position and velocity interpolate linearly between the bracketing
    /// samples; yaw and pitch take the earlier sample, which at tick-rate
    /// sampling stays within one tick of the true view direction.
    pub fn sample_at(&self, timestamp_ms: u32) -> Option<PoseSample> {
        let first = self.samples.front()?;
        let last = self.samples.back()?;
        if timestamp_ms < first.timestamp_ms || timestamp_ms > last.timestamp_ms {
            return None;
        }

        // Index of the first sample at or after the target time
        let upper = self
            .samples
            .partition_point(|s| s.timestamp_ms < timestamp_ms);
        let after = self.samples[upper];
        if after.timestamp_ms == timestamp_ms || upper == 0 {
            return Some(after);
        }
        let before = self.samples[upper - 1];

        let span = (after.timestamp_ms - before.timestamp_ms) as f32;
        let t = (timestamp_ms - before.timestamp_ms) as f32 / span;
        Some(PoseSample {
            timestamp_ms,
            position: before.position.lerp(after.position, t),
            velocity: before.velocity.lerp(after.velocity, t),
            yaw: before.yaw,
            pitch: before.pitch,
        })
    }

    /// True when `timestamp_ms` falls inside the recorded range
    pub fn covers(&self, timestamp_ms: u32) -> bool {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => {
                timestamp_ms >= first.timestamp_ms && timestamp_ms <= last.timestamp_ms
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Histories for all entities, striped for concurrent access
///
/// The outer map is read-locked by every lookup and write-locked only on
/// spawn and despawn; each entity's ring has its own mutex so recording
/// one entity never contends with sampling another.
#[derive(Debug, Default)]
pub struct LagCompensator {
    histories: RwLock<FxHashMap<EntityId, Arc<Mutex<PositionHistory>>>>,
}

impl LagCompensator {
    pub fn new() -> Self {
        Self::default()
    }

    fn history_for(&self, entity: EntityId) -> Arc<Mutex<PositionHistory>> {
        if let Some(history) = self.histories.read().get(&entity) {
            return Arc::clone(history);
        }
        Arc::clone(self.histories.write().entry(entity).or_default())
    }

    /// Record one entity's pose
    pub fn record(&self, entity: EntityId, sample: PoseSample) {
        self.history_for(entity).lock().record(sample);
    }

    /// Record every live entity's pose at the end of a tick
    pub fn record_world(&self, world: &WorldState, timestamp_ms: u32) {
        for entity in world.entities.values() {
            if !entity.alive {
                continue;
            }
            self.record(
                entity.id,
                PoseSample {
                    timestamp_ms,
                    position: entity.position,
                    velocity: entity.velocity,
                    yaw: entity.yaw,
                    pitch: entity.pitch,
                },
            );
        }
    }

    /// Interpolated pose for one entity, `None` when unknown or uncovered
    pub fn sample_at(&self, entity: EntityId, timestamp_ms: u32) -> Option<PoseSample> {
        let history = Arc::clone(self.histories.read().get(&entity)?);
        let sample = history.lock().sample_at(timestamp_ms);
        sample
    }

    pub fn covers(&self, entity: EntityId, timestamp_ms: u32) -> bool {
        match self.histories.read().get(&entity) {
            Some(history) => history.lock().covers(timestamp_ms),
            None => false,
        }
    }

    /// Check a client-claimed hit position against the historical pose
    ///
    /// The tolerance absorbs interpolation and prediction drift on top of
    /// the target's collision radius. No history at that time means the
    /// claim cannot be verified and is rejected.
    pub fn validate_claimed_position(
        &self,
        entity: EntityId,
        timestamp_ms: u32,
        claimed: FixedVec3,
        hit_radius: f32,
    ) -> bool {
        match self.sample_at(entity, timestamp_ms) {
            Some(sample) => {
                sample.position.distance_to(claimed) <= hit_radius + HIT_CLAIM_TOLERANCE
            }
            None => false,
        }
    }

    /// Drop all history for a despawned entity
    pub fn remove_entity(&self, entity: EntityId) {
        self.histories.write().remove(&entity);
    }

    pub fn entity_count(&self) -> usize {
        self.histories.read().len()
    }
}
