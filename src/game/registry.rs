//! Participant registry - owns every connected participant and its state

use glam::Vec3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::{GameError, ParticipantId};

/// Directional intent applied every tick until overwritten
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Intent {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl Intent {
    pub fn is_idle(&self) -> bool {
        !(self.forward || self.backward || self.left || self.right)
    }
}

/// Participant state in a match (authoritative)
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub color: String,

    pub position: Vec3,
    /// Facing angle in radians
    pub facing: f32,
    pub intent: Intent,

    pub alive: bool,
    /// Wall-clock millis of the last accepted throw
    pub last_throw_ms: Option<u64>,
}

impl Participant {
    pub fn new(id: ParticipantId, display_name: String, color: String, position: Vec3) -> Self {
        Self {
            id,
            display_name,
            color,
            position,
            facing: 0.0,
            intent: Intent::default(),
            alive: true,
            last_throw_ms: None,
        }
    }
}

/// Random spawn point inside `fraction` of the arena radius.
///
/// Angle and radius are sampled independently, so points cluster toward
/// the center rather than being area-uniform.
pub fn random_spawn(rng: &mut ChaCha8Rng, arena_radius: f32, fraction: f32) -> Vec3 {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let distance = arena_radius * fraction * rng.gen::<f32>();
    Vec3::new(angle.cos() * distance, 0.0, angle.sin() * distance)
}

pub fn random_color(rng: &mut ChaCha8Rng) -> String {
    format!("hsl({} 70% 55%)", rng.gen_range(0..360))
}

/// Participants in join order
#[derive(Debug, Clone, Default)]
pub struct PlayerRegistry {
    players: Vec<Participant>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a participant at a random spawn point
    pub fn join(
        &mut self,
        id: ParticipantId,
        display_name: String,
        rng: &mut ChaCha8Rng,
        arena_radius: f32,
        spawn_fraction: f32,
    ) -> Result<&Participant, GameError> {
        if self.contains(&id) {
            return Err(GameError::DuplicateParticipant(id));
        }

        let color = random_color(rng);
        let position = random_spawn(rng, arena_radius, spawn_fraction);
        self.players
            .push(Participant::new(id, display_name, color, position));

        Ok(&self.players[self.players.len() - 1])
    }

    pub fn remove(&mut self, id: &ParticipantId) -> Option<Participant> {
        let index = self.players.iter().position(|p| &p.id == id)?;
        Some(self.players.remove(index))
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.players.iter().any(|p| &p.id == id)
    }

    #[cfg(test)]
    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn get_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Participant> {
        self.players.iter()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut Participant> {
        self.players.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Count alive participants
    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.alive).count()
    }

    /// The only alive participant, if exactly one remains
    pub fn sole_survivor(&self) -> Option<&Participant> {
        let mut alive = self.players.iter().filter(|p| p.alive);
        match (alive.next(), alive.next()) {
            (Some(p), None) => Some(p),
            _ => None,
        }
    }
}
