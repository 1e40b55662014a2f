//! Game simulation modules

pub mod collision;
pub mod input;
pub mod r#match;
pub mod movement;
pub mod phase;
pub mod projectile;
pub mod registry;
pub mod snapshot;

pub use phase::{MatchPhase, PhaseStep};
pub use r#match::{GameMatch, MatchHandle};

use glam::Vec3;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Opaque connection identity of a participant
pub type ParticipantId = Uuid;

/// Intent as received from a client, before it is stored
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntentUpdate {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    /// `None` leaves the stored facing unchanged
    pub facing: Option<f32>,
}

/// Everything that may touch the match, serialized through one queue
#[derive(Debug)]
pub enum Command {
    /// Authenticated participant entering the arena
    Join {
        id: ParticipantId,
        display_name: String,
        /// Channel for messages addressed to this participant only
        direct: mpsc::Sender<ServerMsg>,
    },
    SetIntent {
        id: ParticipantId,
        intent: IntentUpdate,
    },
    RequestThrow {
        id: ParticipantId,
        direction: Option<Vec3>,
    },
    Leave {
        id: ParticipantId,
    },
    /// A delayed phase step coming due
    Transition {
        generation: u64,
        step: PhaseStep,
    },
    /// Operator: skip straight to Live
    ForceStart {
        reply: oneshot::Sender<MatchPhase>,
    },
    /// Operator: reset to Lobby now
    Reset {
        reply: oneshot::Sender<MatchPhase>,
    },
    Status {
        reply: oneshot::Sender<PhaseStatus>,
    },
}

/// Message produced by the simulation, routed by the match driver
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    To(ParticipantId, ServerMsg),
    Broadcast(ServerMsg),
}

/// Summary of the match lifecycle for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PhaseStatus {
    pub phase: MatchPhase,
    pub countdown: u32,
    pub players: usize,
    pub test_mode: bool,
    pub min_players: usize,
}

/// Game errors
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Participant {0} already joined")]
    DuplicateParticipant(ParticipantId),

    #[error("Unknown participant {0}")]
    UnknownParticipant(ParticipantId),
}
