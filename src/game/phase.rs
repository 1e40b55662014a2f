//! Match lifecycle: Lobby -> Countdown -> Live -> Ended -> Lobby
//!
//! Delayed transitions are not executed here. They are queued as
//! [`ScheduledStep`]s tagged with the generation current at scheduling time;
//! the match driver arms a timer for each and feeds it back through the
//! command queue. Every transition that starts or abandons a chain bumps the
//! generation, so a step from an older chain is rejected on arrival.

use serde::Serialize;
use std::time::Duration;

use crate::config::GameConfig;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Waiting for players
    Lobby,
    /// Countdown before start
    Countdown,
    /// Match in progress
    Live,
    /// Match ended, reset pending
    Ended,
}

/// A delayed phase step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStep {
    /// Countdown shows this many seconds
    Countdown(u32),
    GoLive,
    Reset,
    /// Try to start the next match after the lobby pause
    Rematch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledStep {
    pub delay: Duration,
    pub generation: u64,
    pub step: PhaseStep,
}

#[derive(Debug, Clone)]
pub struct PhaseController {
    phase: MatchPhase,
    countdown: u32,
    generation: u64,
    scheduled: Vec<ScheduledStep>,
}

impl PhaseController {
    pub fn new() -> Self {
        Self {
            phase: MatchPhase::Lobby,
            countdown: 0,
            generation: 0,
            scheduled: Vec::new(),
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_live(&self) -> bool {
        self.phase == MatchPhase::Live
    }

    /// Start the countdown if in Lobby with enough participants.
    /// Returns whether the countdown started.
    pub fn try_start(&mut self, population: usize, min_players: usize) -> bool {
        if self.phase != MatchPhase::Lobby || population == 0 || population < min_players {
            return false;
        }

        self.generation += 1;
        self.phase = MatchPhase::Countdown;
        self.countdown = GameConfig::COUNTDOWN_SECS;

        for elapsed in 1..GameConfig::COUNTDOWN_SECS {
            self.schedule(
                Duration::from_secs(elapsed as u64),
                PhaseStep::Countdown(GameConfig::COUNTDOWN_SECS - elapsed),
            );
        }
        self.schedule(
            Duration::from_secs(GameConfig::COUNTDOWN_SECS as u64),
            PhaseStep::GoLive,
        );
        true
    }

    /// Jump to Live from Lobby or Countdown, abandoning any countdown chain
    pub fn force_live(&mut self) -> bool {
        if !matches!(self.phase, MatchPhase::Lobby | MatchPhase::Countdown) {
            return false;
        }
        self.generation += 1;
        self.phase = MatchPhase::Live;
        self.countdown = 0;
        true
    }

    /// End a running match and schedule its reset
    pub fn end(&mut self, reset_delay: Duration) -> bool {
        if !matches!(self.phase, MatchPhase::Countdown | MatchPhase::Live) {
            return false;
        }
        self.generation += 1;
        self.phase = MatchPhase::Ended;
        self.countdown = 0;
        self.schedule(reset_delay, PhaseStep::Reset);
        true
    }

    /// Back to Lobby; anything still scheduled becomes stale.
    /// A rematch attempt is scheduled after the lobby pause.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.phase = MatchPhase::Lobby;
        self.countdown = 0;
        self.schedule(GameConfig::REMATCH_DELAY, PhaseStep::Rematch);
    }

    /// Apply a scheduled step if it still belongs to the current chain.
    ///
    /// `Reset` and `Rematch` are only validated here, the caller performs
    /// them since they touch participants and projectiles.
    pub fn accept(&mut self, generation: u64, step: PhaseStep) -> bool {
        if generation != self.generation {
            return false;
        }

        match (self.phase, step) {
            (MatchPhase::Countdown, PhaseStep::Countdown(remaining)) => {
                self.countdown = remaining;
                true
            }
            (MatchPhase::Countdown, PhaseStep::GoLive) => {
                self.phase = MatchPhase::Live;
                self.countdown = 0;
                true
            }
            (MatchPhase::Ended, PhaseStep::Reset) => true,
            (MatchPhase::Lobby, PhaseStep::Rematch) => true,
            _ => false,
        }
    }

    /// Steps scheduled since the last call
    pub fn take_scheduled(&mut self) -> Vec<ScheduledStep> {
        std::mem::take(&mut self.scheduled)
    }

    fn schedule(&mut self, delay: Duration, step: PhaseStep) {
        self.scheduled.push(ScheduledStep {
            delay,
            generation: self.generation,
            step,
        });
    }
}

impl Default for PhaseController {
    fn default() -> Self {
        Self::new()
    }
}
