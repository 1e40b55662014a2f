//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use glam::Vec3;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::MatchPhase;

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Authenticate and enter the arena
    Join {
        /// Signed join token issued by the lobby service
        #[serde(default)]
        token: String,
    },

    /// Latest movement/aim intent, replaces the previous one entirely
    SetIntent {
        #[serde(default, deserialize_with = "truthy")]
        forward: bool,
        #[serde(default, deserialize_with = "truthy")]
        backward: bool,
        #[serde(default, deserialize_with = "truthy")]
        left: bool,
        #[serde(default, deserialize_with = "truthy")]
        right: bool,
        /// Facing angle in radians, `None` keeps the current facing
        #[serde(default, deserialize_with = "finite_number")]
        facing: Option<f32>,
    },

    /// Throw a projectile along `direction`
    RequestThrow {
        /// `None` when missing or malformed
        #[serde(default, deserialize_with = "lenient_direction")]
        direction: Option<Vec3>,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once to the joining participant
    Spawned {
        id: Uuid,
        name: String,
        color: String,
        position: Vec3,
    },

    /// A participant was hit and is out for the rest of the match
    Eliminated { id: Uuid },

    /// Match has ended
    MatchEnded {
        winner_id: Option<Uuid>,
        winner_name: Option<String>,
    },

    /// Full world state (sent at regular intervals)
    WorldSnapshot {
        phase: MatchPhase,
        /// Seconds left while counting down, otherwise 0
        countdown: u32,
        arena_radius: f32,
        players: Vec<PlayerSnapshot>,
        projectiles: Vec<ProjectileSnapshot>,
    },

    /// Join refused
    Rejected { reason: String },
}

/// Participant state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub position: Vec3,
    /// Facing angle in radians
    pub facing: f32,
    pub alive: bool,
}

/// Projectile state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectileSnapshot {
    pub id: Uuid,
    pub position: Vec3,
}

/// Truthiness as browsers send it: `true`, non-zero numbers, non-empty strings
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

fn finite_number<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_f64()
        .map(|f| f as f32)
        .filter(|f| f.is_finite()))
}

fn lenient_direction<'de, D>(deserializer: D) -> Result<Option<Vec3>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Some(items) = value.as_array() else {
        return Ok(None);
    };
    if items.len() < 3 {
        return Ok(None);
    }

    let mut components = [0.0f32; 3];
    for (slot, item) in components.iter_mut().zip(items) {
        match item.as_f64().map(|f| f as f32) {
            Some(f) if f.is_finite() => *slot = f,
            _ => return Ok(None),
        }
    }
    Ok(Some(Vec3::from_array(components)))
}
