//! Pure synchronous core for the simgate session layer.
//!
//! Defines the payloads exchanged with remote agent clients, the transport
//! contract, the per-slot episode lifecycle and the settings surface.
//! No async here; the runtime wrapper lives in `simgate-session`.

pub mod error;
pub mod lifecycle;
pub mod settings;
pub mod transport;
pub mod types;

pub use error::{SessionError, SettingsError, TransportError};
pub use lifecycle::SlotPhase;
pub use settings::{LevelSettings, ServerSettings, SimulatorSettings};
pub use transport::{ClientTransport, Endpoint, IoMode, Progress, TransportFactory};
pub use types::{
    AgentKind, Control, ControlSink, Location, MeasurementSnapshot, NonPlayerAgent, PlayerState,
    Rotation, SpawnPoint, Transform,
};
