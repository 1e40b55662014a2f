//! Snapshot building

use crate::ws::protocol::{PlayerSnapshot, ProjectileSnapshot, ServerMsg};

use super::phase::PhaseController;
use super::projectile::Projectile;
use super::registry::PlayerRegistry;

/// Builds full world snapshots for network transmission.
///
/// Every snapshot carries the complete world; there is no delta encoding or
/// per-observer filtering.
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn build(
        phase: &PhaseController,
        arena_radius: f32,
        players: &PlayerRegistry,
        projectiles: &[Projectile],
    ) -> ServerMsg {
        let players = players
            .all()
            .map(|p| PlayerSnapshot {
                id: p.id,
                name: p.display_name.clone(),
                color: p.color.clone(),
                position: p.position,
                facing: p.facing,
                alive: p.alive,
            })
            .collect();

        let projectiles = projectiles
            .iter()
            .map(|p| ProjectileSnapshot {
                id: p.id,
                position: p.position,
            })
            .collect();

        ServerMsg::WorldSnapshot {
            phase: phase.phase(),
            countdown: phase.countdown(),
            arena_radius,
            players,
            projectiles,
        }
    }
}
