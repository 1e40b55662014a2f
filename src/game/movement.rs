//! Participant movement and arena bounds

use glam::Vec3;

use super::registry::{Intent, PlayerRegistry};

/// Movement system for advancing participant positions from stored intent
pub struct MovementSystem;

impl MovementSystem {
    /// Unit planar direction for an intent (zero when idle).
    ///
    /// Forward is -Z, right is +X. Opposite keys cancel out.
    pub fn planar_direction(intent: &Intent) -> Vec3 {
        let mut x = 0.0;
        let mut z = 0.0;
        if intent.forward {
            z -= 1.0;
        }
        if intent.backward {
            z += 1.0;
        }
        if intent.left {
            x -= 1.0;
        }
        if intent.right {
            x += 1.0;
        }

        let magnitude = match f32::hypot(x, z) {
            m if m > 0.0 => m,
            _ => 1.0,
        };
        Vec3::new(x / magnitude, 0.0, z / magnitude)
    }

    /// Pull a position back inside the arena circle by radial rescaling.
    /// Height is untouched.
    pub fn clamp_to_arena(position: Vec3, arena_radius: f32) -> Vec3 {
        let distance = position.x.hypot(position.z);
        if distance > arena_radius {
            let scale = arena_radius / distance;
            Vec3::new(position.x * scale, position.y, position.z * scale)
        } else {
            position
        }
    }

    /// Advance every alive participant by `dt` seconds
    pub fn step(players: &mut PlayerRegistry, move_speed: f32, arena_radius: f32, dt: f32) {
        for player in players.all_mut() {
            if !player.alive || player.intent.is_idle() {
                continue;
            }

            let direction = Self::planar_direction(&player.intent);
            let moved = player.position + direction * move_speed * dt;
            player.position = Self::clamp_to_arena(moved, arena_radius);
        }
    }
}
