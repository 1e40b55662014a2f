//! Match state and authoritative tick loop

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::GameConfig;
use crate::util::time::{clamp_tick_delta, unix_millis};
use crate::ws::protocol::ServerMsg;

use super::collision::CollisionSystem;
use super::input::InputSystem;
use super::movement::MovementSystem;
use super::phase::{MatchPhase, PhaseController, PhaseStep, ScheduledStep};
use super::projectile::{Projectile, ProjectileSystem};
use super::registry::{random_spawn, Intent, PlayerRegistry};
use super::snapshot::SnapshotBuilder;
use super::{Command, GameError, IntentUpdate, Outbound, ParticipantId, PhaseStatus};

/// The world: the only mutable game state, owned by the match task
#[derive(Clone)]
pub struct MatchState {
    pub config: GameConfig,
    pub phase: PhaseController,
    pub players: PlayerRegistry,
    pub projectiles: Vec<Projectile>,
    rng: ChaCha8Rng,
    outbox: Vec<Outbound>,
}

impl MatchState {
    pub fn new(config: GameConfig, seed: u64) -> Self {
        Self {
            config,
            phase: PhaseController::new(),
            players: PlayerRegistry::new(),
            projectiles: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            outbox: Vec::new(),
        }
    }

    /// Add an authenticated participant and greet them with their spawn
    pub fn join(&mut self, id: ParticipantId, display_name: String) -> Result<(), GameError> {
        let participant = self.players.join(
            id,
            display_name,
            &mut self.rng,
            self.config.arena_radius,
            GameConfig::SPAWN_RADIUS_FRACTION,
        )?;

        let spawned = ServerMsg::Spawned {
            id,
            name: participant.display_name.clone(),
            color: participant.color.clone(),
            position: participant.position,
        };
        self.outbox.push(Outbound::To(id, spawned));

        info!(
            participant_id = %id,
            player_count = self.players.len(),
            "Participant joined"
        );

        self.try_start_match();
        Ok(())
    }

    /// Remove a departed participant; ends a running match that can no
    /// longer be contested
    pub fn leave(&mut self, id: &ParticipantId) -> Result<(), GameError> {
        self.players
            .remove(id)
            .ok_or(GameError::UnknownParticipant(*id))?;

        info!(
            participant_id = %id,
            player_count = self.players.len(),
            "Participant left"
        );

        if self.players.alive_count() < 2 {
            self.end_match(GameConfig::EARLY_RESET_DELAY);
        }
        Ok(())
    }

    /// Start the countdown when enough participants are waiting.
    /// In test mode a lone participant goes straight to Live.
    pub fn try_start_match(&mut self) -> bool {
        if self.config.test_mode {
            if self.phase.phase() == MatchPhase::Lobby
                && !self.players.is_empty()
                && self.phase.force_live()
            {
                info!("Test mode: match live without countdown");
                return true;
            }
            return false;
        }

        let started = self
            .phase
            .try_start(self.players.len(), self.config.min_players);
        if started {
            info!(
                generation = self.phase.generation(),
                player_count = self.players.len(),
                "Match countdown started"
            );
        }
        started
    }

    /// Operator override: go Live now, abandoning any countdown
    pub fn force_start(&mut self) -> bool {
        let started = self.phase.force_live();
        if started {
            info!(generation = self.phase.generation(), "Operator forced match start");
        }
        started
    }

    pub fn set_intent(&mut self, id: &ParticipantId, update: &IntentUpdate) -> bool {
        let phase = self.phase.phase();
        let Some(player) = self.players.get_mut(id) else {
            return false;
        };
        if !InputSystem::accepts_input(phase, self.config.test_mode, player) {
            return false;
        }
        InputSystem::apply_intent(player, update);
        true
    }

    /// Validate a throw and spawn its projectile. Returns whether it was accepted.
    pub fn request_throw(
        &mut self,
        id: &ParticipantId,
        direction: Option<Vec3>,
        now_ms: u64,
    ) -> bool {
        let phase = self.phase.phase();
        let Some(player) = self.players.get_mut(id) else {
            return false;
        };
        if !InputSystem::accepts_input(phase, self.config.test_mode, player) {
            return false;
        }
        if !InputSystem::cooldown_elapsed(player.last_throw_ms, now_ms, self.config.throw_cooldown_ms)
        {
            debug!(participant_id = %id, "Throw rejected, cooldown active");
            return false;
        }

        player.last_throw_ms = Some(now_ms);
        let projectile = Projectile::new(
            player.id,
            player.position,
            InputSystem::normalize_direction(direction),
            self.config.projectile_speed,
            GameConfig::THROW_HEIGHT,
            now_ms,
        );
        self.projectiles.push(projectile);
        true
    }

    /// One simulation step: movement, projectiles, collisions, end check
    pub fn tick(&mut self, dt: f32, now_ms: u64) {
        if self.phase.is_live() || self.config.test_mode {
            MovementSystem::step(
                &mut self.players,
                self.config.move_speed,
                self.config.arena_radius,
                dt,
            );
        }

        ProjectileSystem::step(
            &mut self.projectiles,
            dt,
            now_ms,
            self.config.projectile_lifetime_ms,
        );

        let eliminated =
            CollisionSystem::resolve(&self.projectiles, &mut self.players, self.config.hit_radius);
        for id in eliminated {
            info!(participant_id = %id, "Participant eliminated");
            self.outbox
                .push(Outbound::Broadcast(ServerMsg::Eliminated { id }));
        }

        self.check_win_condition();
    }

    /// Apply a scheduled phase step unless a newer chain superseded it
    pub fn apply_transition(&mut self, generation: u64, step: PhaseStep) -> bool {
        if !self.phase.accept(generation, step) {
            debug!(
                generation,
                current_generation = self.phase.generation(),
                ?step,
                "Ignoring stale phase step"
            );
            return false;
        }

        match step {
            PhaseStep::Countdown(remaining) => debug!(remaining, "Countdown"),
            PhaseStep::GoLive => info!(generation, "Match is live"),
            PhaseStep::Reset => self.reset_match(),
            PhaseStep::Rematch => {
                self.try_start_match();
            }
        }
        true
    }

    /// Back to Lobby with every remaining participant revived at a fresh spawn
    pub fn reset_match(&mut self) {
        self.phase.reset();
        self.projectiles.clear();

        let arena_radius = self.config.arena_radius;
        for player in self.players.all_mut() {
            player.alive = true;
            player.position = random_spawn(
                &mut self.rng,
                arena_radius,
                GameConfig::SPAWN_RADIUS_FRACTION,
            );
            player.last_throw_ms = None;
            player.intent = Intent::default();
        }

        info!(
            generation = self.phase.generation(),
            player_count = self.players.len(),
            "Match reset"
        );
    }

    pub fn snapshot(&self) -> ServerMsg {
        SnapshotBuilder::build(
            &self.phase,
            self.config.arena_radius,
            &self.players,
            &self.projectiles,
        )
    }

    pub fn status(&self) -> PhaseStatus {
        PhaseStatus {
            phase: self.phase.phase(),
            countdown: self.phase.countdown(),
            players: self.players.len(),
            test_mode: self.config.test_mode,
            min_players: self.config.min_players,
        }
    }

    /// Messages produced since the last call
    pub fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Phase steps that need a timer
    pub fn take_scheduled(&mut self) -> Vec<ScheduledStep> {
        self.phase.take_scheduled()
    }

    /// Check win condition
    fn check_win_condition(&mut self) {
        if !self.phase.is_live() {
            return;
        }
        // A lone tester keeps playing instead of winning instantly
        if self.config.test_mode && self.players.len() < 2 {
            return;
        }

        if self.players.alive_count() <= 1 {
            self.end_match(GameConfig::RESET_DELAY);
        }
    }

    fn end_match(&mut self, reset_delay: Duration) {
        if !self.phase.end(reset_delay) {
            return;
        }

        let winner = self.players.sole_survivor();
        let winner_id = winner.map(|p| p.id);
        let winner_name = winner.map(|p| p.display_name.clone());

        info!(
            generation = self.phase.generation(),
            winner_id = ?winner_id,
            "Match ended"
        );

        self.outbox.push(Outbound::Broadcast(ServerMsg::MatchEnded {
            winner_id,
            winner_name,
        }));
    }
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub command_tx: mpsc::Sender<Command>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
}

impl MatchHandle {
    /// Receiver for snapshots and match-wide events
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.snapshot_tx.subscribe()
    }

    /// Queue a command for the match task. Returns false once the match is gone.
    pub async fn send(&self, command: Command) -> bool {
        self.command_tx.send(command).await.is_ok()
    }
}

/// The authoritative game match
pub struct GameMatch {
    state: MatchState,
    command_rx: mpsc::Receiver<Command>,
    /// Used by phase timers to post back into the queue
    command_tx: mpsc::WeakSender<Command>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    /// Per-participant channels for directed messages
    direct: HashMap<ParticipantId, mpsc::Sender<ServerMsg>>,
}

impl GameMatch {
    /// Create a new match
    pub fn new(config: GameConfig, seed: u64) -> (Self, MatchHandle) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(64);

        let handle = MatchHandle {
            command_tx: command_tx.clone(),
            snapshot_tx: snapshot_tx.clone(),
        };

        let game_match = Self {
            state: MatchState::new(config, seed),
            command_rx,
            command_tx: command_tx.downgrade(),
            snapshot_tx,
            direct: HashMap::new(),
        };

        (game_match, handle)
    }

    /// Run the authoritative loop until every handle is dropped.
    ///
    /// Commands, simulation ticks and snapshot broadcasts all run on this
    /// one task, never concurrently with each other.
    pub async fn run(mut self) {
        let config = self.state.config.clone();
        info!(
            tick_rate = config.tick_rate,
            snapshot_rate = config.snapshot_rate,
            test_mode = config.test_mode,
            "Match loop started"
        );

        let mut tick_interval = interval(config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut snapshot_interval = interval(config.snapshot_duration());
        snapshot_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = clamp_tick_delta(now.duration_since(last_tick), GameConfig::MAX_TICK_DT);
                    last_tick = now;
                    self.run_tick(dt);
                }
                _ = snapshot_interval.tick() => {
                    // No subscribers is not an error
                    let _ = self.snapshot_tx.send(self.state.snapshot());
                }
            }

            self.flush();
        }

        info!("Match loop stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Join {
                id,
                display_name,
                direct,
            } => {
                // The spawn message is routed on flush, after the channel is registered
                match self.state.join(id, display_name) {
                    Ok(()) => {
                        self.direct.insert(id, direct);
                    }
                    Err(e) => {
                        error!(participant_id = %id, error = %e, "Join rejected");
                        let _ = direct.try_send(ServerMsg::Rejected {
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Command::SetIntent { id, intent } => {
                self.state.set_intent(&id, &intent);
            }
            Command::RequestThrow { id, direction } => {
                self.state.request_throw(&id, direction, unix_millis());
            }
            Command::Leave { id } => {
                self.direct.remove(&id);
                if let Err(e) = self.state.leave(&id) {
                    debug!(error = %e, "Leave for unknown participant");
                }
            }
            Command::Transition { generation, step } => {
                self.state.apply_transition(generation, step);
            }
            Command::ForceStart { reply } => {
                self.state.force_start();
                let _ = reply.send(self.state.phase.phase());
            }
            Command::Reset { reply } => {
                self.state.reset_match();
                let _ = reply.send(self.state.phase.phase());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.state.status());
            }
        }
    }

    /// Run one tick, rolling back to the pre-tick state if it panics
    fn run_tick(&mut self, dt: f32) {
        let now_ms = unix_millis();
        guarded(&mut self.state, |state| state.tick(dt, now_ms));
    }

    /// Deliver produced messages and arm timers for scheduled phase steps
    fn flush(&mut self) {
        for outbound in self.state.take_outbox() {
            match outbound {
                Outbound::Broadcast(msg) => {
                    let _ = self.snapshot_tx.send(msg);
                }
                Outbound::To(id, msg) => {
                    let Some(direct) = self.direct.get(&id) else {
                        continue;
                    };
                    if direct.try_send(msg).is_err() {
                        debug!(participant_id = %id, "Dropped directed message");
                    }
                }
            }
        }

        for scheduled in self.state.take_scheduled() {
            let Some(command_tx) = self.command_tx.upgrade() else {
                break;
            };
            tokio::spawn(async move {
                tokio::time::sleep(scheduled.delay).await;
                let _ = command_tx
                    .send(Command::Transition {
                        generation: scheduled.generation,
                        step: scheduled.step,
                    })
                    .await;
            });
        }
    }
}

/// Run `step` against the state, restoring the pre-step state if it panics.
/// Returns false when the step was rolled back.
fn guarded(state: &mut MatchState, step: impl FnOnce(&mut MatchState)) -> bool {
    let checkpoint = state.clone();
    let result = panic::catch_unwind(AssertUnwindSafe(|| step(state)));
    if result.is_err() {
        error!("Simulation tick panicked, restoring last good state");
        *state = checkpoint;
        return false;
    }
    true
}
