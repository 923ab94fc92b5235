/// Tick timing constants
///
/// The movement step and prediction replay both assume this fixed timestep.
/// Changing the tick rate invalidates every recorded input dt.
pub mod timing {
    /// Server simulation tick rate in Hz
    pub const TICK_RATE: u32 = 60;
    /// Fixed timestep per tick in seconds
    pub const DT: f32 = 1.0 / TICK_RATE as f32;
    /// Tick duration in milliseconds
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
    /// Snapshot broadcast rate in Hz
    pub const SNAPSHOT_RATE: u32 = 20;
    /// Ticks between snapshot broadcasts
    pub const TICKS_PER_SNAPSHOT: u64 = (TICK_RATE / SNAPSHOT_RATE) as u64;
}

/// Movement constants - must match the client simulation exactly
pub mod movement {
    /// Maximum ground speed in m/s
    pub const MAX_SPEED: f32 = 6.0;
    /// Sprint speed multiplier
    pub const SPRINT_MULTIPLIER: f32 = 1.5;
    /// Acceleration toward wish direction in m/s^2
    pub const ACCELERATION: f32 = 10.0;
    /// Deceleration when no input in m/s^2
    pub const DECELERATION: f32 = 8.0;
}

/// Combat and lag compensation constants
pub mod combat {
    /// Position history retention window in milliseconds
    pub const HISTORY_WINDOW_MS: u32 = 2000;
    /// Maximum samples kept per entity (2 seconds at 60 Hz)
    pub const MAX_HISTORY_SAMPLES: usize = 120;
    /// Maximum one-way latency the server will rewind for
    pub const MAX_REWIND_MS: u32 = 500;
    /// Radius around the attacker searched for hit candidates, in meters
    pub const TARGET_SEARCH_RADIUS: f32 = 50.0;
    /// Collision sphere radius for ranged hit tests, in meters
    pub const PLAYER_HIT_RADIUS: f32 = 0.5;
    /// Extra slack on hit-claim validation, absorbs prediction drift
    pub const HIT_CLAIM_TOLERANCE: f32 = 1.0;
}

/// Wire protocol constants
pub mod net {
    /// Protocol version major half: breaking layout/quantization changes
    pub const PROTOCOL_VERSION_MAJOR: u16 = 1;
    /// Protocol version minor half: additive changes only
    pub const PROTOCOL_VERSION_MINOR: u16 = 0;
    /// Combined version embedded in every snapshot and correction header
    pub const PROTOCOL_VERSION: u32 =
        ((PROTOCOL_VERSION_MAJOR as u32) << 16) | PROTOCOL_VERSION_MINOR as u32;

    /// Position quantization: i16 steps of 1/64 m
    pub const POSITION_QUANTIZE: f32 = 64.0;
    /// Velocity quantization: i16 steps of 1/256 m/s
    pub const VELOCITY_QUANTIZE: f32 = 256.0;
    /// Yaw/pitch quantization on input records: i16 steps of 0.0001 rad
    pub const ANGLE_QUANTIZE: f32 = 10000.0;
    /// Quaternion component quantization on snapshots: i8 in -127..127
    pub const QUAT_QUANTIZE: f32 = 127.0;

    /// MTU-safe cap for unreliable packets
    pub const MAX_PACKET_SIZE: usize = 1400;
    /// Upper bound on entities in one snapshot
    pub const MAX_ENTITIES_PER_SNAPSHOT: usize = 256;
    /// Snapshots retained per recipient until acknowledged
    pub const MAX_BASELINES: usize = 30;
}

/// Delta change-detection tolerances
///
/// Below these, a field counts as unchanged and is omitted from the delta.
/// They must stay at or above the wire quantization error, otherwise
/// quantization noise alone would dirty every field every snapshot.
pub mod delta {
    /// Position tolerance in meters (~2 cm)
    pub const POSITION_EPSILON: f32 = 0.02;
    /// Velocity tolerance in m/s
    pub const VELOCITY_EPSILON: f32 = 0.05;
    /// Rotation tolerance in radians
    pub const ROTATION_EPSILON: f32 = 0.01;
}

/// Client prediction constants
pub mod prediction {
    use super::{combat, timing};

    /// Pending-input buffer capacity: history window x tick rate
    pub const INPUT_BUFFER_CAPACITY: usize =
        (combat::HISTORY_WINDOW_MS / 1000) as usize * timing::TICK_RATE as usize;
    /// Errors at or below this are prediction noise, no correction applied
    pub const CORRECT_THRESHOLD: f32 = 0.1;
    /// Errors above this snap instead of blending (desync / respawn)
    pub const SNAP_THRESHOLD: f32 = 2.0;
    /// Visual blend duration for smoothed corrections, in seconds
    pub const BLEND_DURATION: f32 = 0.12;
}
