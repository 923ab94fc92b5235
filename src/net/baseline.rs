//! Per-recipient baseline tracking for delta encoding
//!
//! Every connection deltas against the last snapshot it acknowledged, so
//! the server keeps a short ring of sent snapshots per recipient. An ack
//! promotes that snapshot to the active baseline and discards older ones;
//! a recipient that stops acking falls back to full-state encoding once
//! its ring overflows the unacked window.

use std::collections::VecDeque;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::game::constants::net::MAX_BASELINES;
use crate::game::state::EntityId;
use crate::net::snapshot::{encode_snapshot, DeltaStats, EncodedDelta, EntityState};
use crate::net::wire::WireError;

/// One snapshot as sent to a recipient, retained until acked or evicted
#[derive(Debug, Clone)]
struct SentSnapshot {
    tick: u32,
    entities: FxHashMap<EntityId, EntityState>,
}

/// Baseline state for a single connection
#[derive(Debug, Default)]
pub struct BaselineTracker {
    /// Snapshots sent but not yet acknowledged, oldest first
    pending: VecDeque<SentSnapshot>,
    /// Last acknowledged snapshot, the active delta baseline
    baseline: Option<SentSnapshot>,
}

impl BaselineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick of the active baseline, 0 when none is established
    pub fn baseline_tick(&self) -> u32 {
        self.baseline.as_ref().map_or(0, |s| s.tick)
    }

    /// Record the recipient's view after applying the packet we just sent
    ///
    /// The view is the active baseline with the packet's removals erased
    /// and its entity records applied on top. Entities deferred by the
    /// packet budget keep their baseline values and stay dirty. When the
    /// unacked ring is full the oldest pending snapshot is dropped; it
    /// can no longer be promoted to a baseline.
    fn record_sent(&mut self, tick: u32, current: &[EntityState], sent: &[EntityState]) {
        let mut entities = self
            .baseline
            .as_ref()
            .map(|b| b.entities.clone())
            .unwrap_or_default();
        entities.retain(|id, _| current.iter().any(|e| e.id == *id));
        for state in sent {
            entities.insert(state.id, *state);
        }

        if self.pending.len() >= MAX_BASELINES {
            self.pending.pop_front();
        }
        self.pending.push_back(SentSnapshot { tick, entities });
    }

    /// Process a snapshot acknowledgement from the client
    ///
    /// Returns false when the acked tick is unknown, either stale (already
    /// superseded by a newer baseline) or evicted. The active baseline is
    /// unchanged in that case.
    pub fn acknowledge(&mut self, tick: u32) -> bool {
        let index = match self.pending.iter().position(|s| s.tick == tick) {
            Some(i) => i,
            None => return false,
        };
        // Everything up to and including the acked snapshot is superseded
        let acked = self.pending.drain(..=index).last();
        self.baseline = acked;
        true
    }

    /// Entities in the baseline that are absent from the current state
    fn removed_since_baseline(&self, current: &[EntityState]) -> Vec<EntityId> {
        let baseline = match &self.baseline {
            Some(b) => b,
            None => return Vec::new(),
        };
        baseline
            .entities
            .keys()
            .filter(|id| !current.iter().any(|e| e.id == **id))
            .copied()
            .collect()
    }

    /// Encode one snapshot for this recipient and remember what was sent
    pub fn encode(
        &mut self,
        server_tick: u32,
        current: &[EntityState],
    ) -> Result<(Vec<u8>, DeltaStats), WireError> {
        let removed = self.removed_since_baseline(current);
        let empty = FxHashMap::default();
        let baseline_map = self.baseline.as_ref().map_or(&empty, |b| &b.entities);
        let EncodedDelta { bytes, stats, sent } = encode_snapshot(
            server_tick,
            self.baseline_tick(),
            current,
            baseline_map,
            &removed,
        )?;
        self.record_sent(server_tick, current, &sent);
        Ok((bytes, stats))
    }
}

/// All recipients' baseline state, owned by the snapshot broadcast step
#[derive(Debug, Default)]
pub struct BaselineStore {
    recipients: FxHashMap<Uuid, BaselineTracker>,
}

/// One encoded snapshot ready to send
pub struct OutboundSnapshot {
    pub recipient: Uuid,
    pub result: Result<(Vec<u8>, DeltaStats), WireError>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection; a fresh tracker deltas against nothing,
    /// producing a full first snapshot
    pub fn add_recipient(&mut self, connection: Uuid) {
        self.recipients.entry(connection).or_default();
    }

    /// Drop all state for a disconnected client
    pub fn remove_recipient(&mut self, connection: Uuid) {
        self.recipients.remove(&connection);
    }

    pub fn acknowledge(&mut self, connection: Uuid, tick: u32) -> bool {
        self.recipients
            .get_mut(&connection)
            .is_some_and(|t| t.acknowledge(tick))
    }

    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    /// Encode this tick's snapshot for every recipient in parallel
    ///
    /// Each recipient's delta is independent, so the fan-out runs on the
    /// rayon pool. Encoding failures are surfaced per recipient rather
    /// than aborting the broadcast.
    pub fn encode_all(&mut self, server_tick: u32, current: &[EntityState]) -> Vec<OutboundSnapshot> {
        self.recipients
            .par_iter_mut()
            .map(|(connection, tracker)| OutboundSnapshot {
                recipient: *connection,
                result: tracker.encode(server_tick, current),
            })
            .collect()
    }
}
