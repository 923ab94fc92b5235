//! Visual smoothing for reconciliation corrections
//!
//! When reconciliation moves the simulated position, the render position
//! keeps a decaying offset toward the old location so the camera glides
//! instead of popping. The simulation itself is corrected instantly; only
//! what the player sees is eased.

use crate::game::constants::prediction::BLEND_DURATION;
use crate::util::vec3::Vec3;

/// Decaying visual offset after a correction
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectionBlend {
    offset: Vec3,
    elapsed: f32,
    active: bool,
}

impl CorrectionBlend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin easing from `offset` back to zero
    ///
    /// A correction arriving mid-blend restarts the ease from the new
    /// offset, which already includes whatever residual was on screen.
    pub fn start(&mut self, offset: Vec3) {
        self.offset = offset;
        self.elapsed = 0.0;
        self.active = true;
    }

    /// Cancel any in-flight blend (used on snap corrections)
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance the blend and return the current visual offset
    pub fn update(&mut self, dt: f32) -> Vec3 {
        if !self.active {
            return Vec3::ZERO;
        }
        self.elapsed += dt;
        if self.elapsed >= BLEND_DURATION {
            self.reset();
            return Vec3::ZERO;
        }
        let t = self.elapsed / BLEND_DURATION;
        // Cubic ease-out toward zero offset
        let remaining = (1.0 - t).powi(3);
        self.offset * remaining
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
