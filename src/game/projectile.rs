//! Projectile spawning, flight and expiry

use glam::Vec3;
use uuid::Uuid;

use super::ParticipantId;

/// Ground plane height
pub const GROUND_LEVEL: f32 = 0.0;

/// Active projectile in the game
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    pub owner_id: ParticipantId,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Wall-clock millis at spawn
    pub spawned_at_ms: u64,
}

impl Projectile {
    /// Create a projectile leaving `thrower_position` along a unit `direction`
    pub fn new(
        owner_id: ParticipantId,
        thrower_position: Vec3,
        direction: Vec3,
        speed: f32,
        throw_height: f32,
        now_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            position: thrower_position + Vec3::Y * throw_height,
            velocity: direction * speed,
            spawned_at_ms: now_ms,
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.spawned_at_ms)
    }

    /// Integrate position. Height is clamped at the ground but the vertical
    /// velocity is kept, so a downward throw slides along the floor.
    pub fn update(&mut self, dt: f32) {
        self.position += self.velocity * dt;
        if self.position.y < GROUND_LEVEL {
            self.position.y = GROUND_LEVEL;
        }
    }
}

/// Projectile system for advancing and retiring projectiles
pub struct ProjectileSystem;

impl ProjectileSystem {
    /// Move every projectile, then drop those at or past their lifetime.
    /// Returns how many expired.
    pub fn step(projectiles: &mut Vec<Projectile>, dt: f32, now_ms: u64, lifetime_ms: u64) -> usize {
        for projectile in projectiles.iter_mut() {
            projectile.update(dt);
        }

        let before = projectiles.len();
        projectiles.retain(|p| p.age_ms(now_ms) < lifetime_ms);
        before - projectiles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projectile(direction: Vec3, now_ms: u64) -> Projectile {
        Projectile::new(Uuid::new_v4(), Vec3::ZERO, direction, 24.0, 1.0, now_ms)
    }

    #[test]
    fn spawns_above_thrower_with_scaled_velocity() {
        let p = Projectile::new(
            Uuid::new_v4(),
            Vec3::new(2.0, 0.0, 3.0),
            Vec3::NEG_Z,
            24.0,
            1.0,
            1_000,
        );
        assert_eq!(p.position, Vec3::new(2.0, 1.0, 3.0));
        assert_eq!(p.velocity, Vec3::new(0.0, 0.0, -24.0));
        assert_eq!(p.spawned_at_ms, 1_000);
    }

    #[test]
    fn ground_clamp_keeps_vertical_velocity() {
        let mut p = projectile(Vec3::NEG_Y, 0);
        p.update(0.5);
        assert_eq!(p.position.y, GROUND_LEVEL);
        assert_eq!(p.velocity.y, -24.0);

        // Still pinned on the next step
        p.update(0.5);
        assert_eq!(p.position.y, GROUND_LEVEL);
    }

    #[test]
    fn expiry_is_bounded_by_one_tick() {
        let lifetime_ms = 1_800;
        let tick_ms = 33;
        let mut projectiles = vec![projectile(Vec3::X, 0)];

        let mut now_ms = 0;
        let mut removed_at = None;
        while removed_at.is_none() {
            now_ms += tick_ms;
            if ProjectileSystem::step(&mut projectiles, tick_ms as f32 / 1000.0, now_ms, lifetime_ms) > 0 {
                removed_at = Some(now_ms);
            }
        }

        let age = removed_at.unwrap();
        assert!(age >= lifetime_ms);
        assert!(age < lifetime_ms + tick_ms);
    }

    #[test]
    fn only_expired_projectiles_are_removed() {
        let mut projectiles = vec![projectile(Vec3::X, 0), projectile(Vec3::Z, 1_000)];
        assert_eq!(ProjectileSystem::step(&mut projectiles, 0.0, 1_800, 1_800), 1);
        assert_eq!(projectiles.len(), 1);
        assert_eq!(projectiles[0].spawned_at_ms, 1_000);
    }
}
