//! Client-side prediction and server reconciliation
//!
//! The client applies its own inputs immediately through the shared
//! movement step and keeps every unacknowledged input buffered. When an
//! authoritative correction arrives, acknowledged inputs are dropped, the
//! predicted state at the acknowledged sequence is compared against the
//! server's, and on divergence the server state is adopted and the
//! remaining inputs replayed. Replay uses the same `step` the original
//! predictions used, so a correct prediction replays to itself exactly.

use std::collections::VecDeque;

use crate::game::constants::prediction::{
    CORRECT_THRESHOLD, INPUT_BUFFER_CAPACITY, SNAP_THRESHOLD,
};
use crate::game::movement::{step, MoveInput, MoveState};
use crate::net::snapshot::Correction;
use crate::predict::smoothing::CorrectionBlend;
use crate::util::vec3::Vec3;

/// One locally applied input awaiting server acknowledgement
#[derive(Debug, Clone, Copy)]
pub struct PredictedInput {
    pub sequence: u32,
    pub timestamp_ms: u32,
    pub input: MoveInput,
    /// State after applying this input, the reconciliation reference
    pub predicted: MoveState,
    pub dt: f32,
}

/// How a correction was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// Older than a correction already applied, ignored
    Discarded,
    /// Divergence within noise threshold, prediction stands
    InSync,
    /// Server state adopted, inputs replayed, visual blend started
    Blended,
    /// Large divergence: server state adopted and replayed without blending
    Snapped,
}

/// Running reconciliation counters
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionStats {
    pub predictions: u64,
    pub corrections_blended: u64,
    pub corrections_snapped: u64,
    pub corrections_in_sync: u64,
    pub corrections_discarded: u64,
    pub inputs_evicted: u64,
}

/// Client-side movement predictor for the local player
#[derive(Debug, Default)]
pub struct ClientPredictor {
    state: MoveState,
    pending: VecDeque<PredictedInput>,
    next_sequence: u32,
    last_applied_tick: Option<u32>,
    blend: CorrectionBlend,
    stats: PredictionStats,
}

impl ClientPredictor {
    pub fn new(initial: MoveState) -> Self {
        Self {
            state: initial,
            next_sequence: 1,
            ..Self::default()
        }
    }

    /// Current simulated state (without visual smoothing)
    pub fn state(&self) -> MoveState {
        self.state
    }

    pub fn pending_inputs(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> PredictionStats {
        self.stats
    }

    /// Apply a local input immediately and buffer it for reconciliation
    ///
    /// Returns the sequence number to attach to the outgoing input record.
    /// Under prolonged server silence the buffer evicts its oldest entry;
    /// an input the server never acknowledged within the buffer window can
    /// no longer be replayed anyway.
    pub fn predict(&mut self, input: MoveInput, timestamp_ms: u32, dt: f32) -> u32 {
        self.state = step(self.state, &input, dt);
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if self.pending.len() >= INPUT_BUFFER_CAPACITY {
            self.pending.pop_front();
            self.stats.inputs_evicted += 1;
        }
        self.pending.push_back(PredictedInput {
            sequence,
            timestamp_ms,
            input,
            predicted: self.state,
            dt,
        });
        self.stats.predictions += 1;
        sequence
    }

    /// Reconcile against an authoritative correction
    ///
    /// Corrections may arrive out of order; anything older than the last
    /// applied tick is discarded. Applying the same correction twice is
    /// harmless: the first application leaves the predicted state equal to
    /// the server state, so the second sees zero error.
    pub fn apply_correction(&mut self, correction: &Correction) -> CorrectionOutcome {
        if let Some(last) = self.last_applied_tick {
            if correction.server_tick < last {
                self.stats.corrections_discarded += 1;
                return CorrectionOutcome::Discarded;
            }
        }
        self.last_applied_tick = Some(correction.server_tick);

        // What we predicted at the acknowledged sequence. If that input
        // already left the buffer, compare against the current state.
        let reference = self
            .pending
            .iter()
            .find(|p| p.sequence == correction.last_processed_sequence)
            .map(|p| p.predicted)
            .unwrap_or(self.state);

        // Acknowledged inputs are settled
        self.pending
            .retain(|p| p.sequence > correction.last_processed_sequence);

        let server_state = MoveState {
            position: correction.position.to_vec3(),
            velocity: correction.velocity.to_vec3(),
        };
        let error = reference.position.distance_to(server_state.position);

        if error <= CORRECT_THRESHOLD {
            self.stats.corrections_in_sync += 1;
            return CorrectionOutcome::InSync;
        }

        let rendered_before = self.state.position;
        self.state = server_state;
        self.replay_pending();

        if error > SNAP_THRESHOLD {
            self.blend.reset();
            self.stats.corrections_snapped += 1;
            CorrectionOutcome::Snapped
        } else {
            // Ease the render position from where it was toward the
            // corrected trajectory
            self.blend.start(rendered_before - self.state.position);
            self.stats.corrections_blended += 1;
            CorrectionOutcome::Blended
        }
    }

    /// Re-apply every unacknowledged input on top of the adopted state
    fn replay_pending(&mut self) {
        for pending in self.pending.iter_mut() {
            self.state = step(self.state, &pending.input, pending.dt);
            pending.predicted = self.state;
        }
    }

    /// Position to render this frame, including correction smoothing
    pub fn render_position(&mut self, dt: f32) -> Vec3 {
        self.state.position + self.blend.update(dt)
    }
}
