//! Transport contract between the session layer and one remote client.
//!
//! Defined here as a synchronous trait so that any implementation, socket
//! codec or scripted test double, plugs into the controller the same way.
//! Blocking behaviour is caller-selected per call; the transport's configured
//! timeout is the only bound on a blocking wait.

use std::time::Duration;

use crate::error::TransportError;
use crate::settings::SimulatorSettings;
use crate::types::{Control, MeasurementSnapshot, SpawnPoint};

/// Each client occupies a triple of consecutive ports (world, stream,
/// control), so additional clients are offset by three per slot.
pub const PORTS_PER_CLIENT: u16 = 3;

/// Blocking behaviour of a single protocol call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Blocking,
    NonBlocking,
}

impl IoMode {
    pub fn is_blocking(self) -> bool {
        matches!(self, IoMode::Blocking)
    }
}

/// Outcome of a read that may legitimately have nothing to deliver yet.
///
/// Paired with `Result`, this gives the tri-state every protocol read needs:
/// `Ok(Ready(_))` success, `Ok(Pending)` no data yet, `Err(_)` failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress<T> {
    Ready(T),
    Pending,
}

impl<T> Progress<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Progress::Ready(_))
    }
}

/// One bidirectional channel to a single remote client.
pub trait ClientTransport: Send {
    /// Wait for the client to connect.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Exchange the episode configuration. `Ready` means the client accepted
    /// (or requested) a new episode; `Pending` is only possible non-blocking.
    fn negotiate_episode(
        &mut self,
        settings: &SimulatorSettings,
        mode: IoMode,
    ) -> Result<Progress<()>, TransportError>;

    /// Send the viable spawn points for the current episode. Blocking.
    fn send_scene_description(&mut self, spots: &[SpawnPoint]) -> Result<(), TransportError>;

    /// Read the client's chosen spawn-point index. Blocking.
    fn read_episode_start(&mut self) -> Result<usize, TransportError>;

    /// Acknowledge that the episode is ready to run. Blocking.
    fn send_episode_ready(&mut self) -> Result<(), TransportError>;

    /// Send one measurement snapshot. Blocking.
    fn send_measurements(
        &mut self,
        snapshot: &MeasurementSnapshot,
        include_non_players: bool,
    ) -> Result<(), TransportError>;

    /// Read one control command. `Pending` means no new control this frame.
    fn read_control(&mut self, mode: IoMode) -> Result<Progress<Control>, TransportError>;
}

/// Address of one client slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub port: u16,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Endpoint of additional client `index`, offset from the primary port.
    pub fn additional(world_port: u16, timeout: Duration, index: usize) -> Self {
        let offset = PORTS_PER_CLIENT * (index as u16 + 1);
        Self {
            port: world_port + offset,
            timeout,
        }
    }
}

/// Constructs per-slot transports for the controller.
///
/// The controller builds a fresh transport whenever it (re)initializes a
/// slot; a transport is never reused once its slot has died.
pub trait TransportFactory {
    type Transport: ClientTransport;

    fn open(&mut self, endpoint: Endpoint) -> Self::Transport;
}

impl<T, F> TransportFactory for F
where
    T: ClientTransport,
    F: FnMut(Endpoint) -> T,
{
    type Transport = T;

    fn open(&mut self, endpoint: Endpoint) -> T {
        self(endpoint)
    }
}
