//! Delta-compressed snapshot, correction, and input codecs
//!
//! The server encodes each recipient's world view against the last baseline
//! that recipient acknowledged: one dirty bit per field group, quantized
//! fixed-width fields, unchanged entities omitted entirely. The decoder
//! applies only the fields its mask selects and never zeroes an absent
//! field. Every packet carries the protocol version; a major mismatch is
//! rejected before anything else is read.

use rustc_hash::FxHashMap;

use crate::game::constants::delta::{POSITION_EPSILON, ROTATION_EPSILON, VELOCITY_EPSILON};
use crate::game::constants::net::{
    ANGLE_QUANTIZE, MAX_ENTITIES_PER_SNAPSHOT, MAX_PACKET_SIZE, POSITION_QUANTIZE,
    PROTOCOL_VERSION, QUAT_QUANTIZE, VELOCITY_QUANTIZE,
};
use crate::game::movement::MoveInput;
use crate::game::state::{Entity, EntityId};
use crate::net::wire::{FrameBuilder, FrameReader, WireError};
use crate::util::fixed::FixedVec3;

/// Dirty bits, one per field group
pub mod field_mask {
    pub const POSITION: u16 = 1 << 0;
    pub const ROTATION: u16 = 1 << 1;
    pub const VELOCITY: u16 = 1 << 2;
    pub const HEALTH: u16 = 1 << 3;
    pub const ANIM_STATE: u16 = 1 << 4;
    pub const ENTITY_TYPE: u16 = 1 << 5;
    /// All fields present, used for entities absent from the baseline
    pub const NEW_ENTITY: u16 = 0xFFFF;
}

/// Replicated view of one entity, the unit of delta comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityState {
    pub id: EntityId,
    pub entity_type: u8,
    pub position: FixedVec3,
    pub velocity: FixedVec3,
    pub yaw: f32,
    pub pitch: f32,
    pub health_percent: u8,
    pub anim_state: u8,
}

impl EntityState {
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            entity_type: entity.entity_type as u8,
            position: entity.position,
            velocity: entity.velocity,
            yaw: entity.yaw,
            pitch: entity.pitch,
            health_percent: entity.health_percent(),
            anim_state: entity.anim_state,
        }
    }

    fn equals_position(&self, other: &EntityState) -> bool {
        self.position.distance_sq_to(other.position) < POSITION_EPSILON * POSITION_EPSILON
    }

    fn equals_rotation(&self, other: &EntityState) -> bool {
        let mut yaw_diff = (self.yaw - other.yaw).abs();
        // Yaw wraps at +/- PI
        if yaw_diff > std::f32::consts::PI {
            yaw_diff = std::f32::consts::TAU - yaw_diff;
        }
        let pitch_diff = (self.pitch - other.pitch).abs();
        yaw_diff < ROTATION_EPSILON && pitch_diff < ROTATION_EPSILON
    }

    fn equals_velocity(&self, other: &EntityState) -> bool {
        self.velocity.distance_sq_to(other.velocity) < VELOCITY_EPSILON * VELOCITY_EPSILON
    }
}

/// Which field groups changed relative to the baseline
pub fn compute_field_mask(current: &EntityState, baseline: &EntityState) -> u16 {
    let mut mask = 0u16;
    if !current.equals_position(baseline) {
        mask |= field_mask::POSITION;
    }
    if !current.equals_rotation(baseline) {
        mask |= field_mask::ROTATION;
    }
    if !current.equals_velocity(baseline) {
        mask |= field_mask::VELOCITY;
    }
    if current.health_percent != baseline.health_percent {
        mask |= field_mask::HEALTH;
    }
    if current.anim_state != baseline.anim_state {
        mask |= field_mask::ANIM_STATE;
    }
    if current.entity_type != baseline.entity_type {
        mask |= field_mask::ENTITY_TYPE;
    }
    mask
}

// ============================================================================
// Quantization
// ============================================================================

fn quantize_position(v: FixedVec3) -> [i16; 3] {
    let m = v.to_vec3();
    [
        (m.x * POSITION_QUANTIZE).round() as i16,
        (m.y * POSITION_QUANTIZE).round() as i16,
        (m.z * POSITION_QUANTIZE).round() as i16,
    ]
}

fn dequantize_position(q: [i16; 3]) -> FixedVec3 {
    FixedVec3::from_vec3(crate::util::vec3::Vec3::new(
        q[0] as f32 / POSITION_QUANTIZE,
        q[1] as f32 / POSITION_QUANTIZE,
        q[2] as f32 / POSITION_QUANTIZE,
    ))
}

fn quantize_velocity(v: FixedVec3) -> [i16; 3] {
    let m = v.to_vec3();
    [
        (m.x * VELOCITY_QUANTIZE).round() as i16,
        (m.y * VELOCITY_QUANTIZE).round() as i16,
        (m.z * VELOCITY_QUANTIZE).round() as i16,
    ]
}

fn dequantize_velocity(q: [i16; 3]) -> FixedVec3 {
    FixedVec3::from_vec3(crate::util::vec3::Vec3::new(
        q[0] as f32 / VELOCITY_QUANTIZE,
        q[1] as f32 / VELOCITY_QUANTIZE,
        q[2] as f32 / VELOCITY_QUANTIZE,
    ))
}

/// Pack yaw as a quantized quaternion around Y: (x, y, z, w) as i8
fn quantize_rotation(yaw: f32) -> [i8; 4] {
    let half = yaw * 0.5;
    [
        0,
        (half.sin() * QUAT_QUANTIZE) as i8,
        0,
        (half.cos() * QUAT_QUANTIZE) as i8,
    ]
}

fn dequantize_rotation(q: [i8; 4]) -> f32 {
    let y = q[1] as f32 / QUAT_QUANTIZE;
    let w = q[3] as f32 / QUAT_QUANTIZE;
    (2.0 * y * w).atan2(1.0 - 2.0 * y * y)
}

// ============================================================================
// Snapshot encoding
// ============================================================================

/// Encoding statistics for metrics
#[derive(Debug, Default, Clone, Copy)]
pub struct DeltaStats {
    pub entities_included: usize,
    pub entities_skipped: usize,
    /// Changed entities that did not fit the packet budget this snapshot
    pub entities_deferred: usize,
}

/// One encoded delta snapshot plus what it actually carried
#[derive(Debug, Clone)]
pub struct EncodedDelta {
    pub bytes: Vec<u8>,
    pub stats: DeltaStats,
    /// Entity states included in the packet, for baseline bookkeeping.
    /// Deferred entities are absent and stay dirty against the next
    /// baseline.
    pub sent: Vec<EntityState>,
}

/// Fixed header: version, server tick, baseline tick, entity count
const SNAPSHOT_HEADER_BYTES: usize = 4 + 4 + 4 + 2;

/// Wire size of one entity record for a given field mask
fn record_bytes(mask: u16) -> usize {
    let mut size = 4 + 2;
    if mask & field_mask::POSITION != 0 {
        size += 6;
    }
    if mask & field_mask::ROTATION != 0 {
        size += 4;
    }
    if mask & field_mask::VELOCITY != 0 {
        size += 6;
    }
    if mask & field_mask::HEALTH != 0 {
        size += 1;
    }
    if mask & field_mask::ANIM_STATE != 0 {
        size += 1;
    }
    if mask & field_mask::ENTITY_TYPE != 0 {
        size += 1;
    }
    size
}

/// Encode a delta snapshot against a recipient's baseline
///
/// Layout: `version u32 | server_tick u32 | baseline_tick u32 |
/// count u16 | records... | removed_count u16 | removed ids u32...`
/// Entity record: `id u32 | mask u16 | fields selected by mask`.
///
/// An empty `baseline` encodes every entity with the new-entity mask, which
/// is how a joining client receives its first full snapshot. The packet
/// stays under the MTU cap: once the byte budget is spent, remaining
/// changed entities are deferred; they re-dirty against the next baseline
/// and ride a later snapshot. Removed-entity ids always fit.
pub fn encode_snapshot(
    server_tick: u32,
    baseline_tick: u32,
    current: &[EntityState],
    baseline: &FxHashMap<EntityId, EntityState>,
    removed: &[EntityId],
) -> Result<EncodedDelta, WireError> {
    if current.len() > MAX_ENTITIES_PER_SNAPSHOT {
        return Err(WireError::Malformed("too many entities for one snapshot"));
    }

    let removed_bytes = 2 + 4 * removed.len();
    let mut budget = MAX_PACKET_SIZE
        .checked_sub(SNAPSHOT_HEADER_BYTES + removed_bytes)
        .ok_or(WireError::Malformed("removed list exceeds packet budget"))?;

    let mut stats = DeltaStats::default();
    let mut included: Vec<(&EntityState, u16)> = Vec::with_capacity(current.len());
    for state in current {
        let mask = match baseline.get(&state.id) {
            Some(base) => compute_field_mask(state, base),
            None => field_mask::NEW_ENTITY,
        };
        if mask == 0 {
            stats.entities_skipped += 1;
            continue;
        }
        let size = record_bytes(mask);
        if size > budget {
            stats.entities_deferred += 1;
            continue;
        }
        budget -= size;
        stats.entities_included += 1;
        included.push((state, mask));
    }

    let mut frame = FrameBuilder::with_capacity(16 + included.len() * 32)
        .write_u32(PROTOCOL_VERSION)
        .write_u32(server_tick)
        .write_u32(baseline_tick)
        .write_u16(included.len() as u16);

    for &(state, mask) in &included {
        frame = frame.write_u32(state.id).write_u16(mask);
        if mask & field_mask::POSITION != 0 {
            for q in quantize_position(state.position) {
                frame = frame.write_i16(q);
            }
        }
        if mask & field_mask::ROTATION != 0 {
            for q in quantize_rotation(state.yaw) {
                frame = frame.write_i8(q);
            }
        }
        if mask & field_mask::VELOCITY != 0 {
            for q in quantize_velocity(state.velocity) {
                frame = frame.write_i16(q);
            }
        }
        if mask & field_mask::HEALTH != 0 {
            frame = frame.write_u8(state.health_percent);
        }
        if mask & field_mask::ANIM_STATE != 0 {
            frame = frame.write_u8(state.anim_state);
        }
        if mask & field_mask::ENTITY_TYPE != 0 {
            frame = frame.write_u8(state.entity_type);
        }
    }

    frame = frame.write_u16(removed.len() as u16);
    for id in removed {
        frame = frame.write_u32(*id);
    }

    Ok(EncodedDelta {
        bytes: frame.build()?,
        stats,
        sent: included.iter().map(|(state, _)| **state).collect(),
    })
}

/// One decoded entity record; absent fields stay `None`
#[derive(Debug, Clone, Default)]
pub struct EntityUpdate {
    pub id: EntityId,
    pub mask: u16,
    pub position: Option<FixedVec3>,
    pub yaw: Option<f32>,
    pub velocity: Option<FixedVec3>,
    pub health_percent: Option<u8>,
    pub anim_state: Option<u8>,
    pub entity_type: Option<u8>,
}

impl EntityUpdate {
    /// True when the record came from an entity absent from the baseline
    pub fn is_new_entity(&self) -> bool {
        self.mask == field_mask::NEW_ENTITY
    }

    /// Merge this update into a known state, leaving absent fields untouched
    pub fn apply_to(&self, state: &mut EntityState) {
        if let Some(position) = self.position {
            state.position = position;
        }
        if let Some(yaw) = self.yaw {
            state.yaw = yaw;
        }
        if let Some(velocity) = self.velocity {
            state.velocity = velocity;
        }
        if let Some(health) = self.health_percent {
            state.health_percent = health;
        }
        if let Some(anim) = self.anim_state {
            state.anim_state = anim;
        }
        if let Some(entity_type) = self.entity_type {
            state.entity_type = entity_type;
        }
    }
}

/// A fully decoded snapshot
#[derive(Debug, Clone, Default)]
pub struct DecodedSnapshot {
    pub server_tick: u32,
    pub baseline_tick: u32,
    pub entities: Vec<EntityUpdate>,
    pub removed: Vec<EntityId>,
}

/// Decode a snapshot buffer
///
/// Fails atomically: any truncation or version mismatch returns an error
/// and the caller keeps its last good state.
pub fn decode_snapshot(data: &[u8]) -> Result<DecodedSnapshot, WireError> {
    let mut reader = FrameReader::new(data);

    let version = reader.read_u32().ok_or_else(|| reader.truncated())?;
    check_version(version)?;

    let server_tick = reader.read_u32().ok_or_else(|| reader.truncated())?;
    let baseline_tick = reader.read_u32().ok_or_else(|| reader.truncated())?;
    let count = reader.read_u16().ok_or_else(|| reader.truncated())? as usize;
    if count > MAX_ENTITIES_PER_SNAPSHOT {
        return Err(WireError::Malformed("entity count exceeds snapshot cap"));
    }

    let mut entities = Vec::with_capacity(count);
    for _ in 0..count {
        let id = reader.read_u32().ok_or_else(|| reader.truncated())?;
        let mask = reader.read_u16().ok_or_else(|| reader.truncated())?;
        let mut update = EntityUpdate {
            id,
            mask,
            ..Default::default()
        };

        if mask & field_mask::POSITION != 0 {
            let mut q = [0i16; 3];
            for slot in &mut q {
                *slot = reader.read_i16().ok_or_else(|| reader.truncated())?;
            }
            update.position = Some(dequantize_position(q));
        }
        if mask & field_mask::ROTATION != 0 {
            let mut q = [0i8; 4];
            for slot in &mut q {
                *slot = reader.read_i8().ok_or_else(|| reader.truncated())?;
            }
            update.yaw = Some(dequantize_rotation(q));
        }
        if mask & field_mask::VELOCITY != 0 {
            let mut q = [0i16; 3];
            for slot in &mut q {
                *slot = reader.read_i16().ok_or_else(|| reader.truncated())?;
            }
            update.velocity = Some(dequantize_velocity(q));
        }
        if mask & field_mask::HEALTH != 0 {
            update.health_percent = Some(reader.read_u8().ok_or_else(|| reader.truncated())?);
        }
        if mask & field_mask::ANIM_STATE != 0 {
            update.anim_state = Some(reader.read_u8().ok_or_else(|| reader.truncated())?);
        }
        if mask & field_mask::ENTITY_TYPE != 0 {
            update.entity_type = Some(reader.read_u8().ok_or_else(|| reader.truncated())?);
        }

        entities.push(update);
    }

    let removed_count = reader.read_u16().ok_or_else(|| reader.truncated())? as usize;
    let mut removed = Vec::with_capacity(removed_count);
    for _ in 0..removed_count {
        removed.push(reader.read_u32().ok_or_else(|| reader.truncated())?);
    }

    Ok(DecodedSnapshot {
        server_tick,
        baseline_tick,
        entities,
        removed,
    })
}

fn check_version(theirs: u32) -> Result<(), WireError> {
    // Only the major half is binding; minor bumps stay compatible
    if theirs >> 16 != PROTOCOL_VERSION >> 16 {
        return Err(WireError::VersionMismatch {
            ours: PROTOCOL_VERSION,
            theirs,
        });
    }
    Ok(())
}

// ============================================================================
// Correction message
// ============================================================================

/// Authoritative per-player correction, sent only to the owning connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub server_tick: u32,
    pub position: FixedVec3,
    pub velocity: FixedVec3,
    pub last_processed_sequence: u32,
}

/// Layout: `version u32 | server_tick u32 | position 3xi16 |
/// velocity 3xi16 | last_processed_sequence u32`
pub fn encode_correction(correction: &Correction) -> Result<Vec<u8>, WireError> {
    let mut frame = FrameBuilder::with_capacity(24)
        .write_u32(PROTOCOL_VERSION)
        .write_u32(correction.server_tick);
    for q in quantize_position(correction.position) {
        frame = frame.write_i16(q);
    }
    for q in quantize_velocity(correction.velocity) {
        frame = frame.write_i16(q);
    }
    frame.write_u32(correction.last_processed_sequence).build()
}

pub fn decode_correction(data: &[u8]) -> Result<Correction, WireError> {
    let mut reader = FrameReader::new(data);

    let version = reader.read_u32().ok_or_else(|| reader.truncated())?;
    check_version(version)?;

    let server_tick = reader.read_u32().ok_or_else(|| reader.truncated())?;
    let mut pos = [0i16; 3];
    for slot in &mut pos {
        *slot = reader.read_i16().ok_or_else(|| reader.truncated())?;
    }
    let mut vel = [0i16; 3];
    for slot in &mut vel {
        *slot = reader.read_i16().ok_or_else(|| reader.truncated())?;
    }
    let last_processed_sequence = reader.read_u32().ok_or_else(|| reader.truncated())?;

    Ok(Correction {
        server_tick,
        position: dequantize_position(pos),
        velocity: dequantize_velocity(vel),
        last_processed_sequence,
    })
}

// ============================================================================
// Input record
// ============================================================================

/// One client input as carried on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputFrame {
    pub flags: u8,
    pub yaw: f32,
    pub pitch: f32,
    pub sequence: u32,
    pub timestamp_ms: u32,
}

impl InputFrame {
    pub fn to_move_input(&self) -> MoveInput {
        MoveInput {
            flags: self.flags,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}

/// Layout: `flags u8 | yaw i16 | pitch i16 | sequence u32 | timestamp u32`
pub fn encode_input(input: &InputFrame) -> Result<Vec<u8>, WireError> {
    FrameBuilder::with_capacity(13)
        .write_u8(input.flags)
        .write_i16((input.yaw * ANGLE_QUANTIZE) as i16)
        .write_i16((input.pitch * ANGLE_QUANTIZE) as i16)
        .write_u32(input.sequence)
        .write_u32(input.timestamp_ms)
        .build()
}

pub fn decode_input(data: &[u8]) -> Result<InputFrame, WireError> {
    let mut reader = FrameReader::new(data);
    let flags = reader.read_u8().ok_or_else(|| reader.truncated())?;
    let yaw_q = reader.read_i16().ok_or_else(|| reader.truncated())?;
    let pitch_q = reader.read_i16().ok_or_else(|| reader.truncated())?;
    let sequence = reader.read_u32().ok_or_else(|| reader.truncated())?;
    let timestamp_ms = reader.read_u32().ok_or_else(|| reader.truncated())?;

    Ok(InputFrame {
        flags,
        yaw: yaw_q as f32 / ANGLE_QUANTIZE,
        pitch: pitch_q as f32 / ANGLE_QUANTIZE,
        sequence,
        timestamp_ms,
    })
}
