//! Present-time combat rules: cooldowns, damage, death
//!
//! This module owns everything about an attack that does not depend on
//! rewind: whether the attacker may swing at all, how much damage a
//! validated hit deals, and applying that damage to the current world.
//! [`crate::combat::rewind`] decides WHO was hit; damage always lands on
//! the target's current health, never on a historical copy.

use rand::Rng;

use crate::game::state::{Entity, EntityId, WorldState};
use crate::util::vec3::Vec3;

/// Tunable combat parameters
///
/// Health and damage are fixed-point x100, matching
/// [`crate::game::state::MAX_HEALTH`].
#[derive(Debug, Clone)]
pub struct CombatConfig {
    /// Melee reach in meters
    pub melee_range: f32,
    /// Full width of the melee cone in degrees
    pub melee_angle_deg: f32,
    /// Base melee damage (x100)
    pub melee_damage: i32,
    /// Base ranged damage (x100)
    pub ranged_damage: i32,
    /// Base ability damage (x100)
    pub ability_damage: i32,
    /// Minimum milliseconds between attacks
    pub attack_cooldown_ms: u32,
    /// Probability an attack crits, 0.0 to 1.0
    pub crit_chance: f64,
    /// Damage multiplier on a crit
    pub crit_multiplier: f32,
    /// Target collision sphere radius for ranged ray tests, in meters
    pub ranged_hit_radius: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            melee_range: 2.5,
            melee_angle_deg: 60.0,
            melee_damage: 1500,
            ranged_damage: 1000,
            ability_damage: 800,
            attack_cooldown_ms: 500,
            crit_chance: 0.05,
            crit_multiplier: 2.0,
            ranged_hit_radius: crate::game::constants::combat::PLAYER_HIT_RADIUS,
        }
    }
}

/// What kind of attack produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Melee,
    Ranged,
    Ability,
}

/// Outcome of validating one attack against one target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub hit: bool,
    pub target: Option<EntityId>,
    /// Damage dealt (x100), zero on a miss
    pub damage: i32,
    pub is_critical: bool,
    /// True when this hit dropped the target to zero health
    pub target_died: bool,
    pub kind: HitKind,
    /// World position of the hit, for effects
    pub location: Vec3,
}

impl HitResult {
    pub fn miss(kind: HitKind) -> Self {
        Self {
            hit: false,
            target: None,
            damage: 0,
            is_critical: false,
            target_died: false,
            kind,
            location: Vec3::ZERO,
        }
    }
}

/// Present-time combat rules
#[derive(Debug, Default)]
pub struct CombatSystem {
    config: CombatConfig,
}

impl CombatSystem {
    pub fn new(config: CombatConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// May this entity attack at the current server time?
    ///
    /// Dead entities cannot attack, and attacks are rate-limited by the
    /// cooldown regardless of how fast the client sends attack flags.
    pub fn can_attack(&self, attacker: &Entity, now_ms: u32) -> bool {
        attacker.alive
            && now_ms.saturating_sub(attacker.last_attack_ms) >= self.config.attack_cooldown_ms
    }

    /// Base damage for an attack kind
    pub fn base_damage(&self, kind: HitKind) -> i32 {
        match kind {
            HitKind::Melee => self.config.melee_damage,
            HitKind::Ranged => self.config.ranged_damage,
            HitKind::Ability => self.config.ability_damage,
        }
    }

    /// Roll final damage, applying the crit chance
    pub fn calculate_damage<R: Rng>(&self, kind: HitKind, rng: &mut R) -> (i32, bool) {
        let base = self.base_damage(kind);
        if rng.gen_bool(self.config.crit_chance) {
            ((base as f32 * self.config.crit_multiplier) as i32, true)
        } else {
            (base, false)
        }
    }

    /// Apply validated damage to the target's current health
    ///
    /// Returns true when the target died from this hit. Damage to an
    /// already-dead entity is a no-op.
    pub fn apply_damage(&self, world: &mut WorldState, target: EntityId, damage: i32) -> bool {
        let entity = match world.get_mut(target) {
            Some(e) if e.alive => e,
            _ => return false,
        };
        entity.health -= damage;
        if entity.health <= 0 {
            entity.health = 0;
            entity.alive = false;
            return true;
        }
        false
    }

    /// Stamp the attacker's cooldown after a validated attack
    pub fn mark_attack(&self, world: &mut WorldState, attacker: EntityId, now_ms: u32) {
        if let Some(entity) = world.get_mut(attacker) {
            entity.last_attack_ms = now_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{EntityType, MAX_HEALTH};
    use crate::util::fixed::FixedVec3;
    use rand::rngs::mock::StepRng;

    fn world_with_player() -> (WorldState, EntityId) {
        let mut world = WorldState::new();
        let id = world.spawn(EntityType::Player, FixedVec3::ZERO);
        (world, id)
    }

    #[test]
    fn test_cooldown_gates_attacks() {
        let system = CombatSystem::new(CombatConfig::default());
        let (mut world, id) = world_with_player();

        {
            let entity = world.get(id).unwrap();
            assert!(system.can_attack(entity, 1000));
        }
        system.mark_attack(&mut world, id, 1000);
        let entity = world.get(id).unwrap();
        assert!(!system.can_attack(entity, 1200));
        assert!(system.can_attack(entity, 1500));
    }

    #[test]
    fn test_dead_entity_cannot_attack() {
        let system = CombatSystem::new(CombatConfig::default());
        let (mut world, id) = world_with_player();
        world.get_mut(id).unwrap().alive = false;
        assert!(!system.can_attack(world.get(id).unwrap(), 10_000));
    }

    #[test]
    fn test_damage_kills_at_zero() {
        let system = CombatSystem::new(CombatConfig::default());
        let (mut world, id) = world_with_player();

        assert!(!system.apply_damage(&mut world, id, MAX_HEALTH / 2));
        assert!(world.get(id).unwrap().alive);

        assert!(system.apply_damage(&mut world, id, MAX_HEALTH));
        let entity = world.get(id).unwrap();
        assert!(!entity.alive);
        assert_eq!(entity.health, 0);

        // Further damage to a corpse is a no-op
        assert!(!system.apply_damage(&mut world, id, 100));
    }

    #[test]
    fn test_crit_multiplies_damage() {
        let config = CombatConfig {
            crit_chance: 1.0,
            ..CombatConfig::default()
        };
        let system = CombatSystem::new(config);
        let mut rng = StepRng::new(0, 0);
        let (damage, critical) = system.calculate_damage(HitKind::Melee, &mut rng);
        assert!(critical);
        assert_eq!(damage, 3000);
    }

    #[test]
    fn test_no_crit_uses_base_damage() {
        let config = CombatConfig {
            crit_chance: 0.0,
            ..CombatConfig::default()
        };
        let system = CombatSystem::new(config);
        let mut rng = StepRng::new(0, 0);
        let (damage, critical) = system.calculate_damage(HitKind::Ranged, &mut rng);
        assert!(!critical);
        assert_eq!(damage, 1000);
    }
}
