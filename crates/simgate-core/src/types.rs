//! Payload types exchanged with remote agent clients.
//!
//! These are the data shapes a transport encodes onto the wire; the session
//! layer itself only moves them around. Measurement snapshots are assembled
//! by the host simulation each frame and shared read-only across slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub location: Location,
    pub rotation: Rotation,
}

/// One viable player start. A scene description is a slice of these.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub transform: Transform,
}

impl SpawnPoint {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            transform: Transform {
                location: Location { x, y, z },
                rotation: Rotation::default(),
            },
        }
    }
}

/// Per-tick actuation values for the controlled agent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Control {
    pub steer: f64,
    pub throttle: f64,
    pub brake: f64,
    pub hand_brake: bool,
    pub reverse: bool,
}

/// Player portion of a measurement snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerState {
    pub transform: Transform,
    /// Forward speed in m/s.
    pub forward_speed: f64,
    pub collision_vehicles: f64,
    pub collision_pedestrians: f64,
    pub collision_other: f64,
    /// Fraction of the car invading the opposite lane, in [0, 1].
    pub intersection_otherlane: f64,
    /// Fraction of the car off-road, in [0, 1].
    pub intersection_offroad: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Vehicle,
    Pedestrian,
    TrafficLight,
    SpeedLimitSign,
}

/// State of one non-player agent, included in measurements only when the
/// settings ask for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonPlayerAgent {
    pub id: u32,
    pub kind: AgentKind,
    pub transform: Transform,
    pub forward_speed: f64,
}

/// World and agent state for one simulation frame.
///
/// Owned by the host loop, handed by reference to every live slot each tick.
/// The session layer never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSnapshot {
    pub frame_number: u64,
    /// In-game time since episode start, in milliseconds.
    pub game_timestamp_ms: u32,
    pub platform_timestamp: DateTime<Utc>,
    pub player: PlayerState,
    pub non_player_agents: Vec<NonPlayerAgent>,
}

impl MeasurementSnapshot {
    pub fn new(frame_number: u64, game_timestamp_ms: u32, player: PlayerState) -> Self {
        Self {
            frame_number,
            game_timestamp_ms,
            platform_timestamp: Utc::now(),
            player,
            non_player_agents: Vec::new(),
        }
    }
}

/// Seam to the simulated agent that receives control commands.
///
/// Only the primary connection's control is ever applied; observer
/// connections' control reads are consumed and discarded.
pub trait ControlSink {
    fn apply_control(&mut self, control: Control);
}

impl<T: ControlSink> ControlSink for std::sync::Arc<std::sync::Mutex<T>> {
    fn apply_control(&mut self, control: Control) {
        if let Ok(mut inner) = self.lock() {
            inner.apply_control(control);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_defaults_to_neutral() {
        let c = Control::default();
        assert_eq!(c.steer, 0.0);
        assert_eq!(c.throttle, 0.0);
        assert!(!c.hand_brake);
        assert!(!c.reverse);
    }

    #[test]
    fn spawn_point_at() {
        let s = SpawnPoint::at(1.0, 2.0, 3.0);
        assert_eq!(s.transform.location.y, 2.0);
        assert_eq!(s.transform.rotation, Rotation::default());
    }
}
