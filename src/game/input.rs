//! Input ingestion: intent storage, throw validation

use glam::Vec3;

use super::phase::MatchPhase;
use super::registry::{Intent, Participant};
use super::IntentUpdate;

/// Direction used when a throw request carries no usable direction
pub const FALLBACK_DIRECTION: Vec3 = Vec3::NEG_Z;

pub struct InputSystem;

impl InputSystem {
    /// Whether a participant may steer or throw right now
    pub fn accepts_input(phase: MatchPhase, test_mode: bool, participant: &Participant) -> bool {
        participant.alive && (test_mode || phase == MatchPhase::Live)
    }

    /// Replace the stored intent entirely; facing only changes when provided
    pub fn apply_intent(participant: &mut Participant, update: &IntentUpdate) {
        participant.intent = Intent {
            forward: update.forward,
            backward: update.backward,
            left: update.left,
            right: update.right,
        };
        if let Some(facing) = update.facing.filter(|f| f.is_finite()) {
            participant.facing = facing;
        }
    }

    /// Whether the cooldown since the last accepted throw has elapsed
    pub fn cooldown_elapsed(last_throw_ms: Option<u64>, now_ms: u64, cooldown_ms: u64) -> bool {
        match last_throw_ms {
            Some(last) => now_ms.saturating_sub(last) >= cooldown_ms,
            None => true,
        }
    }

    /// Unit throw direction, falling back to forward when missing or degenerate
    pub fn normalize_direction(direction: Option<Vec3>) -> Vec3 {
        direction
            .filter(|d| d.is_finite())
            .and_then(|d| d.try_normalize())
            .unwrap_or(FALLBACK_DIRECTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn participant() -> Participant {
        Participant::new(Uuid::new_v4(), "P".into(), "hsl(0 70% 55%)".into(), Vec3::ZERO)
    }

    #[test]
    fn input_requires_live_phase_unless_test_mode() {
        let mut p = participant();
        assert!(!InputSystem::accepts_input(MatchPhase::Lobby, false, &p));
        assert!(!InputSystem::accepts_input(MatchPhase::Countdown, false, &p));
        assert!(InputSystem::accepts_input(MatchPhase::Live, false, &p));
        assert!(InputSystem::accepts_input(MatchPhase::Lobby, true, &p));

        p.alive = false;
        assert!(!InputSystem::accepts_input(MatchPhase::Live, false, &p));
        assert!(!InputSystem::accepts_input(MatchPhase::Live, true, &p));
    }

    #[test]
    fn intent_overwrites_without_accumulating() {
        let mut p = participant();
        InputSystem::apply_intent(
            &mut p,
            &IntentUpdate {
                forward: true,
                left: true,
                facing: Some(1.0),
                ..Default::default()
            },
        );
        InputSystem::apply_intent(
            &mut p,
            &IntentUpdate {
                right: true,
                facing: None,
                ..Default::default()
            },
        );

        assert_eq!(
            p.intent,
            Intent {
                right: true,
                ..Default::default()
            }
        );
        assert_eq!(p.facing, 1.0);
    }

    #[test]
    fn non_finite_facing_is_ignored() {
        let mut p = participant();
        p.facing = 0.25;
        InputSystem::apply_intent(
            &mut p,
            &IntentUpdate {
                facing: Some(f32::NAN),
                ..Default::default()
            },
        );
        assert_eq!(p.facing, 0.25);
    }

    #[test]
    fn cooldown_uses_wall_clock_difference() {
        assert!(InputSystem::cooldown_elapsed(None, 0, 600));
        assert!(!InputSystem::cooldown_elapsed(Some(1_000), 1_599, 600));
        assert!(InputSystem::cooldown_elapsed(Some(1_000), 1_600, 600));
    }

    #[test]
    fn degenerate_directions_fall_back_to_forward() {
        assert_eq!(InputSystem::normalize_direction(None), FALLBACK_DIRECTION);
        assert_eq!(
            InputSystem::normalize_direction(Some(Vec3::ZERO)),
            FALLBACK_DIRECTION
        );
        assert_eq!(
            InputSystem::normalize_direction(Some(Vec3::new(f32::NAN, 0.0, 1.0))),
            FALLBACK_DIRECTION
        );

        let d = InputSystem::normalize_direction(Some(Vec3::new(3.0, 0.0, 4.0)));
        assert!((d - Vec3::new(0.6, 0.0, 0.8)).length() < 1e-6);
    }
}
