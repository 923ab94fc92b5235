//! Lag-compensated attack validation
//!
//! An attack is judged against the world as the attacker saw it: the
//! server rewinds every candidate target to the attack time derived from
//! the client timestamp and measured RTT, then validates range, cone, or
//! ray geometry against those historical poses. Damage from a validated
//! hit is applied to current health only; the past is read, never
//! mutated.

use std::sync::Arc;

use rand::Rng;
use smallvec::SmallVec;

use crate::combat::history::LagCompensator;
use crate::combat::system::{CombatSystem, HitKind, HitResult};
use crate::game::constants::combat::{MAX_REWIND_MS, TARGET_SEARCH_RADIUS};
use crate::game::state::{EntityId, WorldState};
use crate::metrics::SyncMetrics;
use crate::util::fixed::FixedVec3;
use crate::util::vec3::Vec3;

/// Geometry of one attack
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttackKind {
    /// Cone in front of the attacker, first target hit
    Melee,
    /// Ray along `aim`, nearest intersected target hit
    Ranged { aim: Vec3 },
    /// Sphere around the attacker, every target inside hit
    Ability { radius: f32 },
}

impl AttackKind {
    fn hit_kind(&self) -> HitKind {
        match self {
            AttackKind::Melee => HitKind::Melee,
            AttackKind::Ranged { .. } => HitKind::Ranged,
            AttackKind::Ability { .. } => HitKind::Ability,
        }
    }
}

/// Client-claimed hit, cross-checked against history when present
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaimedHit {
    pub target: EntityId,
    pub position: FixedVec3,
}

/// One attack as received from a client
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackClaim {
    pub attacker: EntityId,
    /// Client timestamp of the attack, on the server clock
    pub client_timestamp_ms: u32,
    /// Measured round-trip time for this connection
    pub rtt_ms: u32,
    pub kind: AttackKind,
    pub claimed: Option<ClaimedHit>,
}

/// How the attack time was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RewindMode {
    /// Validate against interpolated history at this time
    Historical(u32),
    /// Latency beyond the rewind cap: validate against current state
    Present,
}

/// Hit validation over the position history
pub struct LagCompensatedCombat {
    system: CombatSystem,
    compensator: Arc<LagCompensator>,
    metrics: Arc<SyncMetrics>,
}

impl LagCompensatedCombat {
    pub fn new(
        system: CombatSystem,
        compensator: Arc<LagCompensator>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            system,
            compensator,
            metrics,
        }
    }

    pub fn system(&self) -> &CombatSystem {
        &self.system
    }

    /// Resolve the time an attack is validated at
    ///
    /// The attack happened half an RTT before its report arrived. Clients
    /// beyond the rewind cap get no compensation at all; rewinding 500+ ms
    /// would let high-latency clients hit targets that long since moved.
    /// The result never exceeds the current server time.
    fn resolve_attack_time(&self, claim: &AttackClaim, now_ms: u32) -> RewindMode {
        let half_rtt = claim.rtt_ms / 2;
        if half_rtt > MAX_REWIND_MS {
            self.metrics.rewind_fallbacks.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return RewindMode::Present;
        }
        let attack_time = claim.client_timestamp_ms.saturating_add(half_rtt).min(now_ms);
        RewindMode::Historical(attack_time)
    }

    /// Pose a target is validated at
    ///
    /// In historical mode a target with no coverage at the attack time
    /// cannot be validated and is skipped, it never falls back to a pose
    /// the attacker could not have seen.
    fn target_pose(
        &self,
        world: &WorldState,
        target: EntityId,
        mode: RewindMode,
    ) -> Option<(FixedVec3, f32)> {
        match mode {
            RewindMode::Historical(time_ms) => {
                match self.compensator.sample_at(target, time_ms) {
                    Some(sample) => Some((sample.position, sample.yaw)),
                    None => {
                        self.metrics
                            .history_misses
                            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        None
                    }
                }
            }
            RewindMode::Present => world.get(target).map(|e| (e.position, e.yaw)),
        }
    }

    /// Alive entities near the attacker, excluding the attacker
    fn candidates(&self, world: &WorldState, attacker: EntityId, origin: FixedVec3) -> Vec<EntityId> {
        world
            .entities
            .values()
            .filter(|e| {
                e.id != attacker
                    && e.alive
                    && e.position.distance_to(origin) <= TARGET_SEARCH_RADIUS
            })
            .map(|e| e.id)
            .collect()
    }

    /// Validate an attack and apply damage for every confirmed hit
    ///
    /// Returns one result per hit, or a single miss entry. Cooldown is
    /// stamped whenever the attack itself was legal, hit or miss.
    pub fn process_attack<R: Rng>(
        &self,
        world: &mut WorldState,
        claim: &AttackClaim,
        now_ms: u32,
        rng: &mut R,
    ) -> SmallVec<[HitResult; 4]> {
        let kind = claim.kind.hit_kind();
        let mut results = SmallVec::new();

        let (attacker_pos, attacker_yaw) = match world.get(claim.attacker) {
            Some(e) if self.system.can_attack(e, now_ms) => (e.position, e.yaw),
            _ => {
                self.metrics
                    .attacks_rejected
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                results.push(HitResult::miss(kind));
                return results;
            }
        };
        self.system.mark_attack(world, claim.attacker, now_ms);

        let mode = self.resolve_attack_time(claim, now_ms);
        // The attacker's own pose rewinds on the same clock as the targets
        let origin = match mode {
            RewindMode::Historical(time_ms) => self
                .compensator
                .sample_at(claim.attacker, time_ms)
                .map(|s| s.position)
                .unwrap_or(attacker_pos),
            RewindMode::Present => attacker_pos,
        };

        let mut hits: SmallVec<[(EntityId, FixedVec3); 4]> = SmallVec::new();
        match claim.kind {
            AttackKind::Melee => {
                let config = self.system.config();
                let forward = Vec3::from_yaw(attacker_yaw);
                let half_angle_cos =
                    (config.melee_angle_deg.to_radians() * 0.5).cos();
                let mut best: Option<(EntityId, FixedVec3, f32)> = None;
                for target in self.candidates(world, claim.attacker, attacker_pos) {
                    let (pos, _) = match self.target_pose(world, target, mode) {
                        Some(pose) => pose,
                        None => continue,
                    };
                    let distance = origin.distance_to(pos);
                    if distance > config.melee_range {
                        continue;
                    }
                    let to_target = (pos.to_vec3() - origin.to_vec3()).horizontal();
                    // A target on top of the attacker is always in the cone
                    if to_target.length_sq() > 1e-6
                        && forward.dot(to_target.normalize()) < half_angle_cos
                    {
                        continue;
                    }
                    // Melee stops at the nearest valid target
                    if best.map_or(true, |(_, _, d)| distance < d) {
                        best = Some((target, pos, distance));
                    }
                }
                if let Some((target, pos, _)) = best {
                    hits.push((target, pos));
                }
            }
            AttackKind::Ranged { aim } => {
                let config = self.system.config();
                let direction = aim.normalize();
                if direction.length_sq() > 0.0 {
                    let mut best: Option<(EntityId, FixedVec3, f32)> = None;
                    for target in self.candidates(world, claim.attacker, attacker_pos) {
                        let (pos, _) = match self.target_pose(world, target, mode) {
                            Some(pose) => pose,
                            None => continue,
                        };
                        let t = match ray_sphere(
                            origin.to_vec3(),
                            direction,
                            pos.to_vec3(),
                            config.ranged_hit_radius,
                        ) {
                            Some(t) => t,
                            None => continue,
                        };
                        if best.map_or(true, |(_, _, best_t)| t < best_t) {
                            best = Some((target, pos, t));
                        }
                    }
                    if let Some((target, pos, _)) = best {
                        hits.push((target, pos));
                    }
                }
            }
            AttackKind::Ability { radius } => {
                for target in self.candidates(world, claim.attacker, attacker_pos) {
                    let (pos, _) = match self.target_pose(world, target, mode) {
                        Some(pose) => pose,
                        None => continue,
                    };
                    if origin.distance_to(pos) <= radius {
                        hits.push((target, pos));
                    }
                }
            }
        }

        // A claimed hit must agree with where the target actually was
        if let (Some(claimed), RewindMode::Historical(time_ms)) = (claim.claimed, mode) {
            let radius = self.system.config().ranged_hit_radius;
            let valid = self.compensator.validate_claimed_position(
                claimed.target,
                time_ms,
                claimed.position,
                radius,
            );
            if !valid {
                hits.retain(|(target, _)| *target != claimed.target);
            }
        }

        if hits.is_empty() {
            self.metrics
                .attacks_rejected
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            results.push(HitResult::miss(kind));
            return results;
        }

        for (target, historical_pos) in hits {
            let (damage, is_critical) = self.system.calculate_damage(kind, rng);
            let target_died = self.system.apply_damage(world, target, damage);
            self.metrics
                .attacks_validated
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            results.push(HitResult {
                hit: true,
                target: Some(target),
                damage,
                is_critical,
                target_died,
                kind,
                location: historical_pos.to_vec3(),
            });
        }
        results
    }
}

/// Nearest non-negative ray/sphere intersection parameter
#[inline]
fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let oc = origin - center;
    let b = oc.dot(direction);
    let c = oc.length_sq() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let sqrt_d = discriminant.sqrt();
    let t = -b - sqrt_d;
    if t >= 0.0 {
        return Some(t);
    }
    let t = -b + sqrt_d;
    (t >= 0.0).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::history::PoseSample;
    use crate::combat::system::CombatConfig;
    use crate::game::state::{EntityType, MAX_HEALTH};
    use rand::rngs::mock::StepRng;

    fn pose(timestamp_ms: u32, position: Vec3) -> PoseSample {
        PoseSample {
            timestamp_ms,
            position: FixedVec3::from_vec3(position),
            velocity: FixedVec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    fn no_crit_config() -> CombatConfig {
        CombatConfig {
            crit_chance: 0.0,
            ..CombatConfig::default()
        }
    }

    fn setup() -> (LagCompensatedCombat, Arc<LagCompensator>, WorldState) {
        let compensator = Arc::new(LagCompensator::new());
        let combat = LagCompensatedCombat::new(
            CombatSystem::new(no_crit_config()),
            Arc::clone(&compensator),
            Arc::new(SyncMetrics::new()),
        );
        (combat, compensator, WorldState::new())
    }

    fn melee_claim(attacker: EntityId, timestamp_ms: u32, rtt_ms: u32) -> AttackClaim {
        AttackClaim {
            attacker,
            client_timestamp_ms: timestamp_ms,
            rtt_ms,
            kind: AttackKind::Melee,
            claimed: None,
        }
    }

    #[test]
    fn test_melee_hits_where_target_was() {
        let (combat, compensator, mut world) = setup();
        // Attacker at x=10.5 facing -X toward the target
        let attacker = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(10.5, 0.0, 0.0)),
        );
        world.get_mut(attacker).unwrap().yaw = -std::f32::consts::FRAC_PI_2;
        let target = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(30.0, 0.0, 0.0)),
        );

        // At the attack time the target stood half a meter away
        for t in 0..10u32 {
            compensator.record(target, pose(900 + t * 50, Vec3::new(10.0, 0.0, 0.0)));
            compensator.record(attacker, pose(900 + t * 50, Vec3::new(10.5, 0.0, 0.0)));
        }

        let mut rng = StepRng::new(0, 0);
        let claim = melee_claim(attacker, 1100, 100);
        let results = combat.process_attack(&mut world, &claim, 1300, &mut rng);

        assert_eq!(results.len(), 1);
        assert!(results[0].hit);
        assert_eq!(results[0].target, Some(target));
        // Damage landed on current health
        assert_eq!(world.get(target).unwrap().health, MAX_HEALTH - 1500);
    }

    #[test]
    fn test_lethal_hit_reports_target_death() {
        let (combat, compensator, mut world) = setup();
        let attacker = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(10.5, 0.0, 0.0)),
        );
        world.get_mut(attacker).unwrap().yaw = -std::f32::consts::FRAC_PI_2;
        let target = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(10.0, 0.0, 0.0)),
        );
        for t in 0..23u32 {
            compensator.record(target, pose(900 + t * 50, Vec3::new(10.0, 0.0, 0.0)));
            compensator.record(attacker, pose(900 + t * 50, Vec3::new(10.5, 0.0, 0.0)));
        }

        // First swing wounds but does not kill
        let mut rng = StepRng::new(0, 0);
        let first =
            combat.process_attack(&mut world, &melee_claim(attacker, 1100, 100), 1300, &mut rng);
        assert!(first[0].hit);
        assert!(!first[0].target_died);

        // Whittle the target down so the next swing is lethal
        world.get_mut(target).unwrap().health = 100;
        let second =
            combat.process_attack(&mut world, &melee_claim(attacker, 1900, 100), 2000, &mut rng);
        assert!(second[0].hit);
        assert!(second[0].target_died);
        assert!(!world.get(target).unwrap().alive);
    }

    #[test]
    fn test_miss_when_target_was_elsewhere() {
        let (combat, compensator, mut world) = setup();
        let attacker = world.spawn(EntityType::Player, FixedVec3::from_vec3(Vec3::new(10.5, 0.0, 0.0)));
        world.get_mut(attacker).unwrap().yaw = -std::f32::consts::FRAC_PI_2;
        // Target is near the attacker NOW but was 40 m away at the attack time
        let target = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(10.1, 0.0, 0.0)),
        );
        for t in 0..10u32 {
            compensator.record(target, pose(900 + t * 50, Vec3::new(50.0, 0.0, 0.0)));
            compensator.record(attacker, pose(900 + t * 50, Vec3::new(10.5, 0.0, 0.0)));
        }

        let mut rng = StepRng::new(0, 0);
        let claim = melee_claim(attacker, 1100, 100);
        let results = combat.process_attack(&mut world, &claim, 1300, &mut rng);

        assert_eq!(results.len(), 1);
        assert!(!results[0].hit);
        assert_eq!(world.get(target).unwrap().health, MAX_HEALTH);
    }

    #[test]
    fn test_excessive_latency_validates_against_present() {
        let (combat, compensator, mut world) = setup();
        let attacker = world.spawn(EntityType::Player, FixedVec3::ZERO);
        world.get_mut(attacker).unwrap().yaw = 0.0;
        // Target is in reach right now, history says it was far away
        let target = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(0.0, 0.0, 1.5)),
        );
        for t in 0..10u32 {
            compensator.record(target, pose(t * 50, Vec3::new(0.0, 0.0, 40.0)));
        }

        let mut rng = StepRng::new(0, 0);
        // rtt/2 = 600 ms, beyond the rewind cap
        let claim = melee_claim(attacker, 400, 1200);
        let results = combat.process_attack(&mut world, &claim, 1000, &mut rng);

        assert!(results[0].hit);
        assert_eq!(results[0].target, Some(target));
    }

    #[test]
    fn test_uncovered_history_fails_closed() {
        let (combat, _compensator, mut world) = setup();
        let attacker = world.spawn(EntityType::Player, FixedVec3::ZERO);
        // Target in reach now, but nothing was ever recorded for it
        world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(0.0, 0.0, 1.5)),
        );

        let mut rng = StepRng::new(0, 0);
        let claim = melee_claim(attacker, 900, 100);
        let results = combat.process_attack(&mut world, &claim, 1000, &mut rng);
        assert!(!results[0].hit);
    }

    #[test]
    fn test_cone_rejects_target_behind() {
        let (combat, compensator, mut world) = setup();
        let attacker = world.spawn(EntityType::Player, FixedVec3::ZERO);
        // Facing +Z, target behind at -Z
        let target = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(0.0, 0.0, -1.5)),
        );
        for t in 0..10u32 {
            compensator.record(target, pose(900 + t * 50, Vec3::new(0.0, 0.0, -1.5)));
            compensator.record(attacker, pose(900 + t * 50, Vec3::ZERO));
        }

        let mut rng = StepRng::new(0, 0);
        let claim = melee_claim(attacker, 1100, 100);
        let results = combat.process_attack(&mut world, &claim, 1300, &mut rng);
        assert!(!results[0].hit);
    }

    #[test]
    fn test_ranged_ray_hits_historical_sphere() {
        let (combat, compensator, mut world) = setup();
        let attacker = world.spawn(EntityType::Player, FixedVec3::ZERO);
        let target = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(30.0, 0.0, 30.0)),
        );
        // Historically the target sat 20 m straight down +Z
        for t in 0..10u32 {
            compensator.record(target, pose(900 + t * 50, Vec3::new(0.0, 0.0, 20.0)));
            compensator.record(attacker, pose(900 + t * 50, Vec3::ZERO));
        }

        let mut rng = StepRng::new(0, 0);
        let claim = AttackClaim {
            attacker,
            client_timestamp_ms: 1100,
            rtt_ms: 100,
            kind: AttackKind::Ranged {
                aim: Vec3::new(0.0, 0.0, 1.0),
            },
            claimed: None,
        };
        let results = combat.process_attack(&mut world, &claim, 1300, &mut rng);
        assert!(results[0].hit);
        assert_eq!(results[0].target, Some(target));
        assert!((results[0].location.z - 20.0).abs() < 0.1);
    }

    #[test]
    fn test_ability_hits_all_in_radius_except_caster() {
        let (combat, compensator, mut world) = setup();
        let caster = world.spawn(EntityType::Player, FixedVec3::ZERO);
        let near = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(3.0, 0.0, 0.0)),
        );
        let far = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(20.0, 0.0, 0.0)),
        );
        for t in 0..10u32 {
            compensator.record(caster, pose(900 + t * 50, Vec3::ZERO));
            compensator.record(near, pose(900 + t * 50, Vec3::new(3.0, 0.0, 0.0)));
            compensator.record(far, pose(900 + t * 50, Vec3::new(20.0, 0.0, 0.0)));
        }

        let mut rng = StepRng::new(0, 0);
        let claim = AttackClaim {
            attacker: caster,
            client_timestamp_ms: 1100,
            rtt_ms: 100,
            kind: AttackKind::Ability { radius: 5.0 },
            claimed: None,
        };
        let results = combat.process_attack(&mut world, &claim, 1300, &mut rng);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].target, Some(near));
        assert_eq!(world.get(far).unwrap().health, MAX_HEALTH);
        assert_eq!(world.get(caster).unwrap().health, MAX_HEALTH);
    }

    #[test]
    fn test_false_hit_claim_rejected() {
        let (combat, compensator, mut world) = setup();
        let attacker = world.spawn(EntityType::Player, FixedVec3::ZERO);
        let target = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(0.0, 0.0, 1.5)),
        );
        for t in 0..10u32 {
            compensator.record(target, pose(900 + t * 50, Vec3::new(0.0, 0.0, 1.5)));
            compensator.record(attacker, pose(900 + t * 50, Vec3::ZERO));
        }

        let mut rng = StepRng::new(0, 0);
        // Claims the target was 10 m from where history puts it
        let claim = AttackClaim {
            attacker,
            client_timestamp_ms: 1100,
            rtt_ms: 100,
            kind: AttackKind::Melee,
            claimed: Some(ClaimedHit {
                target,
                position: FixedVec3::from_vec3(Vec3::new(0.0, 0.0, 11.5)),
            }),
        };
        let results = combat.process_attack(&mut world, &claim, 1300, &mut rng);
        assert!(!results[0].hit);
        assert_eq!(world.get(target).unwrap().health, MAX_HEALTH);
    }

    #[test]
    fn test_cooldown_rejects_rapid_attacks() {
        let (combat, compensator, mut world) = setup();
        let attacker = world.spawn(EntityType::Player, FixedVec3::ZERO);
        let target = world.spawn(
            EntityType::Player,
            FixedVec3::from_vec3(Vec3::new(0.0, 0.0, 1.5)),
        );
        for t in 0..20u32 {
            compensator.record(target, pose(900 + t * 50, Vec3::new(0.0, 0.0, 1.5)));
            compensator.record(attacker, pose(900 + t * 50, Vec3::ZERO));
        }

        let mut rng = StepRng::new(0, 0);
        let first = combat.process_attack(&mut world, &melee_claim(attacker, 1100, 100), 1300, &mut rng);
        assert!(first[0].hit);
        // 100 ms later, still on cooldown
        let second =
            combat.process_attack(&mut world, &melee_claim(attacker, 1200, 100), 1400, &mut rng);
        assert!(!second[0].hit);
    }
}
