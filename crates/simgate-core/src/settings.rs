//! Simulator settings: the configuration surface consumed by the session
//! layer and relayed to clients during episode negotiation.
//!
//! Loaded from a TOML file with a `[server]` and a `[level]` section. Every
//! key is optional; missing keys keep their defaults. A client's episode
//! request may carry a settings fragment of its own; only its level section
//! is honored, the server section is always ignored.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SettingsError;
use crate::transport::Endpoint;

/// Connection and tick-policy settings. Not overridable by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Port to listen on for the primary client connection.
    pub world_port: u16,
    /// Time-out in milliseconds for networking operations.
    pub timeout_ms: u64,
    /// Wait every tick until the primary client's control is received.
    pub synchronous_mode: bool,
    /// Include every non-player agent in each measurement snapshot.
    pub send_non_player_agents_info: bool,
    /// Number of additional observer clients.
    pub additional_clients: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            world_port: 2000,
            timeout_ms: 10_000,
            synchronous_mode: true,
            send_non_player_agents_info: false,
            additional_clients: 0,
        }
    }
}

/// Per-episode level settings. Clients may override these when requesting a
/// new episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSettings {
    /// Path of the vehicle class to spawn for the player.
    pub player_vehicle: String,
    pub number_of_vehicles: u32,
    pub number_of_pedestrians: u32,
    /// Weather preset index. Negative leaves the weather unchanged.
    pub weather_id: i32,
    pub seed_vehicles: u64,
    pub seed_pedestrians: u64,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            player_vehicle: String::new(),
            number_of_vehicles: 5,
            number_of_pedestrians: 15,
            weather_id: -1,
            seed_vehicles: 123_456_789,
            seed_pedestrians: 123_456_789,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub server: ServerSettings,
    pub level: LevelSettings,
}

/// Settings fragment carried by a client's new-episode request. Only level
/// keys that are present get applied.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EpisodeRequest {
    level: LevelOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LevelOverrides {
    player_vehicle: Option<String>,
    number_of_vehicles: Option<u32>,
    number_of_pedestrians: Option<u32>,
    weather_id: Option<i32>,
    seed_vehicles: Option<u64>,
    seed_pedestrians: Option<u64>,
}

impl SimulatorSettings {
    pub fn from_toml_str(contents: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load settings from a TOML file. A missing file is not an error: the
    /// defaults apply.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Apply the level section of a client-supplied settings fragment.
    /// The server section, if present, is ignored.
    pub fn apply_episode_request(&mut self, contents: &str) -> Result<(), SettingsError> {
        let request: EpisodeRequest = toml::from_str(contents)?;
        let level = request.level;
        if let Some(v) = level.player_vehicle {
            self.level.player_vehicle = v;
        }
        if let Some(v) = level.number_of_vehicles {
            self.level.number_of_vehicles = v;
        }
        if let Some(v) = level.number_of_pedestrians {
            self.level.number_of_pedestrians = v;
        }
        if let Some(v) = level.weather_id {
            self.level.weather_id = v;
        }
        if let Some(v) = level.seed_vehicles {
            self.level.seed_vehicles = v;
        }
        if let Some(v) = level.seed_pedestrians {
            self.level.seed_pedestrians = v;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.server.timeout_ms)
    }

    /// Endpoint of the primary client.
    pub fn primary_endpoint(&self) -> Endpoint {
        Endpoint::new(self.server.world_port, self.timeout())
    }

    /// Endpoint of additional client `index`.
    pub fn additional_endpoint(&self, index: usize) -> Endpoint {
        Endpoint::additional(self.server.world_port, self.timeout(), index)
    }

    /// Write the active settings to the log.
    pub fn log(&self) {
        info!(
            world_port = self.server.world_port,
            timeout_ms = self.server.timeout_ms,
            synchronous_mode = self.server.synchronous_mode,
            send_non_player_agents_info = self.server.send_non_player_agents_info,
            additional_clients = self.server.additional_clients,
            "server settings"
        );
        info!(
            player_vehicle = %self.level.player_vehicle,
            number_of_vehicles = self.level.number_of_vehicles,
            number_of_pedestrians = self.level.number_of_pedestrians,
            weather_id = self.level.weather_id,
            "level settings"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let s = SimulatorSettings::default();
        assert_eq!(s.server.world_port, 2000);
        assert_eq!(s.server.timeout_ms, 10_000);
        assert!(s.server.synchronous_mode);
        assert!(!s.server.send_non_player_agents_info);
        assert_eq!(s.server.additional_clients, 0);
        assert_eq!(s.level.number_of_vehicles, 5);
        assert_eq!(s.level.number_of_pedestrians, 15);
        assert_eq!(s.level.weather_id, -1);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = SimulatorSettings::from_toml_str(
            r#"
            [server]
            world_port = 4000
            additional_clients = 2
            "#,
        )
        .unwrap();
        assert_eq!(s.server.world_port, 4000);
        assert_eq!(s.server.additional_clients, 2);
        assert_eq!(s.server.timeout_ms, 10_000);
        assert_eq!(s.level, LevelSettings::default());
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = SimulatorSettings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(s, SimulatorSettings::default());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simgate.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[level]\nnumber_of_vehicles = 30").unwrap();
        let s = SimulatorSettings::load(&path).unwrap();
        assert_eq!(s.level.number_of_vehicles, 30);
        assert_eq!(s.server, ServerSettings::default());
    }

    #[test]
    fn load_bad_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simgate.toml");
        std::fs::write(&path, "[server\nworld_port = ").unwrap();
        assert!(SimulatorSettings::load(&path).is_err());
    }

    #[test]
    fn episode_request_applies_level_only() {
        let mut s = SimulatorSettings::default();
        s.apply_episode_request(
            r#"
            [server]
            world_port = 9999
            synchronous_mode = false

            [level]
            number_of_pedestrians = 40
            weather_id = 3
            "#,
        )
        .unwrap();
        // Server section from the client must be ignored.
        assert_eq!(s.server.world_port, 2000);
        assert!(s.server.synchronous_mode);
        assert_eq!(s.level.number_of_pedestrians, 40);
        assert_eq!(s.level.weather_id, 3);
        // Keys the request omitted keep their previous values.
        assert_eq!(s.level.number_of_vehicles, 5);
    }

    #[test]
    fn additional_endpoints_follow_world_port() {
        let mut s = SimulatorSettings::default();
        s.server.world_port = 2000;
        assert_eq!(s.primary_endpoint().port, 2000);
        assert_eq!(s.additional_endpoint(0).port, 2003);
        assert_eq!(s.additional_endpoint(1).port, 2006);
    }
}
