//! Projectile versus participant hit detection

use glam::Vec3;

use super::projectile::Projectile;
use super::registry::PlayerRegistry;
use super::ParticipantId;

/// Distance on the horizontal plane, ignoring height
pub fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    (a.x - b.x).hypot(a.z - b.z)
}

pub struct CollisionSystem;

impl CollisionSystem {
    /// Eliminate every alive non-owner within `hit_radius` of a projectile.
    ///
    /// Projectiles are not consumed by a hit: one throw can take out several
    /// participants in the same tick and keeps flying until it expires.
    /// Returns eliminated ids in detection order.
    pub fn resolve(
        projectiles: &[Projectile],
        players: &mut PlayerRegistry,
        hit_radius: f32,
    ) -> Vec<ParticipantId> {
        let mut eliminated = Vec::new();

        for projectile in projectiles {
            for player in players.all_mut() {
                if !player.alive || player.id == projectile.owner_id {
                    continue;
                }

                if planar_distance(projectile.position, player.position) < hit_radius {
                    player.alive = false;
                    eliminated.push(player.id);
                }
            }
        }

        eliminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn place(registry: &mut PlayerRegistry, rng: &mut ChaCha8Rng, position: Vec3) -> Uuid {
        let id = Uuid::new_v4();
        registry.join(id, "P".into(), rng, 25.0, 0.7).unwrap();
        registry.get_mut(&id).unwrap().position = position;
        id
    }

    fn projectile_at(owner_id: Uuid, position: Vec3) -> Projectile {
        Projectile {
            id: Uuid::new_v4(),
            owner_id,
            position,
            velocity: Vec3::NEG_Z * 24.0,
            spawned_at_ms: 0,
        }
    }

    #[test]
    fn hit_within_radius_eliminates_target() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut registry = PlayerRegistry::new();
        let a = place(&mut registry, &mut rng, Vec3::ZERO);
        let b = place(&mut registry, &mut rng, Vec3::new(0.5, 0.0, 5.0));

        let projectiles = vec![projectile_at(a, Vec3::new(0.0, 1.0, 5.0))];
        let eliminated = CollisionSystem::resolve(&projectiles, &mut registry, 1.2);

        assert_eq!(eliminated, vec![b]);
        assert!(!registry.get(&b).unwrap().alive);
        assert!(registry.get(&a).unwrap().alive);
    }

    #[test]
    fn owner_is_never_hit() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut registry = PlayerRegistry::new();
        let a = place(&mut registry, &mut rng, Vec3::ZERO);

        let projectiles = vec![projectile_at(a, Vec3::new(0.0, 1.0, 0.0))];
        assert!(CollisionSystem::resolve(&projectiles, &mut registry, 1.2).is_empty());
        assert!(registry.get(&a).unwrap().alive);
    }

    #[test]
    fn height_is_ignored() {
        assert_eq!(
            planar_distance(Vec3::new(0.0, 10.0, 0.0), Vec3::new(3.0, 0.0, 4.0)),
            5.0
        );
    }

    #[test]
    fn one_projectile_can_eliminate_several() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut registry = PlayerRegistry::new();
        let owner = place(&mut registry, &mut rng, Vec3::new(10.0, 0.0, 0.0));
        let b = place(&mut registry, &mut rng, Vec3::new(0.3, 0.0, 0.0));
        let c = place(&mut registry, &mut rng, Vec3::new(-0.3, 0.0, 0.0));
        let far = place(&mut registry, &mut rng, Vec3::new(0.0, 0.0, 1.2));

        let projectiles = vec![projectile_at(owner, Vec3::ZERO)];
        let eliminated = CollisionSystem::resolve(&projectiles, &mut registry, 1.2);

        assert_eq!(eliminated, vec![b, c]);
        assert!(registry.get(&far).unwrap().alive);
    }

    #[test]
    fn dead_participants_are_not_hit_again() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut registry = PlayerRegistry::new();
        let owner = place(&mut registry, &mut rng, Vec3::new(10.0, 0.0, 0.0));
        let b = place(&mut registry, &mut rng, Vec3::ZERO);
        registry.get_mut(&b).unwrap().alive = false;

        let projectiles = vec![
            projectile_at(owner, Vec3::ZERO),
            projectile_at(owner, Vec3::new(0.1, 0.0, 0.0)),
        ];
        assert!(CollisionSystem::resolve(&projectiles, &mut registry, 1.2).is_empty());
    }
}
