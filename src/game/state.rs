use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::movement::MoveState;
use crate::util::fixed::FixedVec3;

/// Stable entity identifier, allocated by the simulation
pub type EntityId = u32;

/// Maximum health in fixed-point units (100 health x 100)
pub const MAX_HEALTH: i32 = 10_000;

/// Entity category carried on the wire as one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntityType {
    Player = 0,
    Npc = 1,
    Projectile = 2,
}

impl EntityType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EntityType::Player),
            1 => Some(EntityType::Npc),
            2 => Some(EntityType::Projectile),
            _ => None,
        }
    }
}

/// Authoritative server-side entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub entity_type: EntityType,
    pub position: FixedVec3,
    pub velocity: FixedVec3,
    /// View yaw in radians (0 = +Z)
    pub yaw: f32,
    pub pitch: f32,
    pub health: i32,
    pub anim_state: u8,
    /// Server timestamp of the last accepted attack, for cooldown checks
    pub last_attack_ms: u32,
    pub alive: bool,
}

impl Entity {
    pub fn new(id: EntityId, entity_type: EntityType, position: FixedVec3) -> Self {
        Self {
            id,
            entity_type,
            position,
            velocity: FixedVec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            health: MAX_HEALTH,
            anim_state: 0,
            last_attack_ms: 0,
            alive: true,
        }
    }

    /// Health as 0-100 for the wire
    pub fn health_percent(&self) -> u8 {
        ((self.health.max(0) * 100) / MAX_HEALTH) as u8
    }

    /// Kinematic state in float space for the shared movement step
    pub fn move_state(&self) -> MoveState {
        MoveState {
            position: self.position.to_vec3(),
            velocity: self.velocity.to_vec3(),
        }
    }

    /// Store a movement result back into fixed-point
    pub fn apply_move_state(&mut self, state: MoveState) {
        self.position = FixedVec3::from_vec3(state.position);
        self.velocity = FixedVec3::from_vec3(state.velocity);
    }
}

/// The authoritative world: mutated only by the single-threaded tick
#[derive(Debug, Default)]
pub struct WorldState {
    pub tick: u64,
    pub entities: HashMap<EntityId, Entity>,
    next_id: EntityId,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a new entity and return its id
    pub fn spawn(&mut self, entity_type: EntityType, position: FixedVec3) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(id, Entity::new(id, entity_type, position));
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Remove an entity (despawn or disconnect)
    ///
    /// The caller must also erase its position history, see
    /// [`crate::combat::history::LagCompensator::remove_entity`].
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec3::Vec3;

    #[test]
    fn test_spawn_assigns_unique_ids() {
        let mut world = WorldState::new();
        let a = world.spawn(EntityType::Player, FixedVec3::ZERO);
        let b = world.spawn(EntityType::Npc, FixedVec3::ZERO);
        assert_ne!(a, b);
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn test_remove_erases_entity() {
        let mut world = WorldState::new();
        let id = world.spawn(EntityType::Player, FixedVec3::ZERO);
        assert!(world.remove(id).is_some());
        assert!(world.get(id).is_none());
    }

    #[test]
    fn test_health_percent() {
        let mut entity = Entity::new(0, EntityType::Player, FixedVec3::ZERO);
        assert_eq!(entity.health_percent(), 100);
        entity.health = MAX_HEALTH / 2;
        assert_eq!(entity.health_percent(), 50);
        entity.health = -50;
        assert_eq!(entity.health_percent(), 0);
    }

    #[test]
    fn test_move_state_round_trip() {
        let mut entity = Entity::new(0, EntityType::Player, FixedVec3::ZERO);
        let mut state = entity.move_state();
        state.position = Vec3::new(1.5, 0.0, -2.25);
        state.velocity = Vec3::new(0.5, 0.0, 0.0);
        entity.apply_move_state(state);
        assert!((entity.position.to_vec3().x - 1.5).abs() < 0.001);
        assert!((entity.velocity.to_vec3().x - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_entity_type_from_u8() {
        assert_eq!(EntityType::from_u8(0), Some(EntityType::Player));
        assert_eq!(EntityType::from_u8(2), Some(EntityType::Projectile));
        assert_eq!(EntityType::from_u8(99), None);
    }
}
