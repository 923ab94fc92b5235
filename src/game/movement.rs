//! Deterministic movement rules shared by server and client
//!
//! `step` is the single implementation of the movement rules. The server
//! integrates authoritative entities with it, the client predicts with it,
//! and reconciliation replays with it. Any second copy of this logic would
//! reintroduce the prediction error that reconciliation exists to remove.

use serde::{Deserialize, Serialize};

use crate::game::constants::movement::{ACCELERATION, DECELERATION, MAX_SPEED, SPRINT_MULTIPLIER};
use crate::util::vec3::Vec3;

/// Action flag bits carried in the 1-byte input bitmask
pub mod action {
    pub const FORWARD: u8 = 0x01;
    pub const BACKWARD: u8 = 0x02;
    pub const LEFT: u8 = 0x04;
    pub const RIGHT: u8 = 0x08;
    pub const JUMP: u8 = 0x10;
    pub const ATTACK: u8 = 0x20;
    pub const BLOCK: u8 = 0x40;
    pub const SPRINT: u8 = 0x80;
}

/// One tick of player input
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveInput {
    /// Packed action flags, see [`action`]
    pub flags: u8,
    /// View yaw in radians (0 = +Z)
    pub yaw: f32,
    /// View pitch in radians
    pub pitch: f32,
}

impl MoveInput {
    #[inline]
    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Normalized horizontal wish direction in world space, or zero
    pub fn wish_direction(&self) -> Vec3 {
        let mut local_x = 0.0f32;
        let mut local_z = 0.0f32;
        if self.has(action::FORWARD) {
            local_z += 1.0;
        }
        if self.has(action::BACKWARD) {
            local_z -= 1.0;
        }
        if self.has(action::RIGHT) {
            local_x += 1.0;
        }
        if self.has(action::LEFT) {
            local_x -= 1.0;
        }
        if local_x == 0.0 && local_z == 0.0 {
            return Vec3::ZERO;
        }

        // Rotate the local direction into world space by yaw
        let forward = Vec3::from_yaw(self.yaw);
        let right = Vec3::new(forward.z, 0.0, -forward.x);
        (forward * local_z + right * local_x).normalize()
    }
}

/// Kinematic state advanced by [`step`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveState {
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Advance movement by one fixed timestep
///
/// Pure function of `(state, input, dt)`. Accelerates toward the wish
/// direction, decelerates toward rest without input, clamps to max speed.
pub fn step(state: MoveState, input: &MoveInput, dt: f32) -> MoveState {
    let wish = input.wish_direction();
    let max_speed = if input.has(action::SPRINT) {
        MAX_SPEED * SPRINT_MULTIPLIER
    } else {
        MAX_SPEED
    };

    let mut velocity = state.velocity;
    if wish.length_sq() > 0.0 {
        velocity += wish * (ACCELERATION * dt);
        velocity = velocity.clamp_length(max_speed);
    } else {
        // Decelerate toward rest, stopping exactly at zero
        let speed = velocity.length();
        let new_speed = (speed - DECELERATION * dt).max(0.0);
        velocity = if speed > 0.0 {
            velocity * (new_speed / speed)
        } else {
            Vec3::ZERO
        };
    }

    MoveState {
        position: state.position + velocity * dt,
        velocity,
    }
}
