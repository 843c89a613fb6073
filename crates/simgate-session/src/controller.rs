//! The session controller.
//!
//! Owns the primary connection slot and the ordered additional slots, drives
//! each through the episode lifecycle, and arbitrates per-tick blocking
//! policy: negotiation is always blocking, the primary control read blocks
//! only under synchronous mode, and observer slots are never awaited.
//!
//! The host simulation loop calls the lifecycle hooks in a fixed order
//! (`initialize`, `choose_player_start`, `register_player`, `begin_play`,
//! then `tick` per frame); out-of-order calls are rejected with a
//! [`SessionError`] rather than assumed away. Transport failures never reach
//! the host: they disable the affected slot, and the host only learns about
//! the primary slot's demise through [`TickOutcome::NeedsRestart`].
//!
//! Known limitation, kept on purpose: additional clients' control commands
//! and spawn selections are read for protocol compliance but never applied
//! to the simulation.

use simgate_core::lifecycle::SlotPhase;
use simgate_core::transport::{IoMode, Progress, TransportFactory};
use simgate_core::types::{ControlSink, MeasurementSnapshot, SpawnPoint};
use simgate_core::{SessionError, SimulatorSettings};
use tracing::{debug, info, warn};

use crate::slot::{ConnectionSlot, SlotId};

/// What the host must do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The primary connection is gone or asked for a new episode: discard
    /// the in-progress session and rebuild via `initialize`.
    NeedsRestart,
}

/// Where the host is in the hook sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum HostPhase {
    Created,
    Initialized,
    Playing,
}

pub struct SessionController<F, S>
where
    F: TransportFactory,
    S: ControlSink,
{
    factory: F,
    settings: SimulatorSettings,
    primary: Option<ConnectionSlot<F::Transport>>,
    additional: Vec<ConnectionSlot<F::Transport>>,
    player: Option<S>,
    host_phase: HostPhase,
    start_chosen: bool,
}

impl<F, S> SessionController<F, S>
where
    F: TransportFactory,
    S: ControlSink,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            settings: SimulatorSettings::default(),
            primary: None,
            additional: Vec::new(),
            player: None,
            host_phase: HostPhase::Created,
            start_chosen: false,
        }
    }

    /// Build the primary slot and the configured additional slots, driving
    /// each independently through connect and the blocking episode
    /// negotiation. A slot that fails either is left dead without aborting
    /// the others; failure is observable only via slot liveness.
    ///
    /// May be called again after a restart: a primary whose connection is
    /// still intact is kept (its next episode was already negotiated by the
    /// new-episode request), everything else is rebuilt from scratch.
    pub fn initialize(&mut self, settings: &SimulatorSettings) {
        self.settings = settings.clone();

        let rebuild_primary = self
            .primary
            .as_ref()
            .is_none_or(|slot| !slot.has_transport());
        if rebuild_primary {
            let transport = self.factory.open(self.settings.primary_endpoint());
            let mut slot = ConnectionSlot::new(SlotId::Primary, transport);
            if !slot.establish(&self.settings) {
                warn!("failed to initialize primary client, session needs restart");
            }
            self.primary = Some(slot);
        } else if let Some(slot) = self.primary.as_mut() {
            slot.reset_for_new_episode();
        }

        info!(
            additional_clients = self.settings.server.additional_clients,
            "initializing additional client slots"
        );
        self.additional.clear();
        for index in 0..self.settings.server.additional_clients {
            let endpoint = self.settings.additional_endpoint(index);
            let transport = self.factory.open(endpoint);
            let mut slot = ConnectionSlot::new(SlotId::Additional(index), transport);
            if !slot.establish(&self.settings) {
                warn!(slot = %slot.id(), "failed to initialize additional client");
            }
            self.additional.push(slot);
        }

        self.host_phase = HostPhase::Initialized;
        self.start_chosen = false;
    }

    /// Broadcast the scene description and collect each client's spawn
    /// selection. The primary's choice, defaulted to 0 when absent or out of
    /// range, decides the returned spawn point.
    pub fn choose_player_start(
        &mut self,
        spots: &[SpawnPoint],
    ) -> Result<SpawnPoint, SessionError> {
        // Re-selection requires a fresh initialize.
        if self.host_phase != HostPhase::Initialized || self.start_chosen {
            return Err(SessionError::OutOfOrder {
                hook: "choose_player_start",
                requires: "initialize",
            });
        }
        if spots.is_empty() {
            return Err(SessionError::NoSpawnPoints);
        }

        let mut start_index = 0usize;
        if let Some(slot) = self.primary.as_mut() {
            if let Some(index) = slot.exchange_scene(spots) {
                if index < spots.len() {
                    start_index = index;
                } else {
                    warn!(
                        index,
                        available = spots.len(),
                        "client requested an invalid player start, using default"
                    );
                }
            }
        }

        for slot in &mut self.additional {
            // Observer selections are read, then discarded; only the primary
            // picks the spawn point.
            let _ = slot.exchange_scene(spots);
        }

        self.start_chosen = true;
        Ok(spots[start_index])
    }

    /// Bind the simulated agent that receives the primary client's control
    /// commands from here on.
    pub fn register_player(&mut self, player: S) -> Result<(), SessionError> {
        if self.host_phase < HostPhase::Initialized {
            return Err(SessionError::OutOfOrder {
                hook: "register_player",
                requires: "initialize",
            });
        }
        self.player = Some(player);
        Ok(())
    }

    /// Acknowledge episode start to every live client.
    pub fn begin_play(&mut self) -> Result<(), SessionError> {
        if self.host_phase != HostPhase::Initialized || !self.start_chosen {
            return Err(SessionError::OutOfOrder {
                hook: "begin_play",
                requires: "choose_player_start",
            });
        }
        if self.player.is_none() {
            return Err(SessionError::NoAgentRegistered);
        }

        if let Some(slot) = self.primary.as_mut() {
            let _ = slot.acknowledge_ready();
        }
        for slot in &mut self.additional {
            let _ = slot.acknowledge_ready();
        }

        self.host_phase = HostPhase::Playing;
        Ok(())
    }

    /// One simulation frame.
    ///
    /// Primary slot first: new-episode poll (non-blocking), measurement
    /// send, control read (blocking iff synchronous mode). Then one pass
    /// over the additional slots in index order, all non-blocking, each
    /// attempted independently. A primary failure aborts the remainder of
    /// the tick; an additional slot's failure disables only that slot.
    pub fn tick(
        &mut self,
        delta_seconds: f64,
        snapshot: &MeasurementSnapshot,
    ) -> Result<TickOutcome, SessionError> {
        if self.host_phase != HostPhase::Playing {
            return Err(SessionError::OutOfOrder {
                hook: "tick",
                requires: "begin_play",
            });
        }
        debug!(delta_seconds, frame = snapshot.frame_number, "tick");

        let include_non_players = self.settings.server.send_non_player_agents_info;
        let control_mode = if self.settings.server.synchronous_mode {
            IoMode::Blocking
        } else {
            IoMode::NonBlocking
        };

        let Some(primary) = self.primary.as_mut() else {
            return Ok(TickOutcome::NeedsRestart);
        };
        if !primary.has_transport() {
            warn!("primary client disconnected, session needs restart");
            return Ok(TickOutcome::NeedsRestart);
        }
        if !primary.is_live() {
            // Restart already requested; nothing to do until the host rebuilds.
            return Ok(TickOutcome::NeedsRestart);
        }
        primary.begin_ticking();

        match primary.poll_new_episode(&self.settings) {
            Some(Progress::Ready(())) => {
                info!("primary client requested a new episode, restarting level");
                primary.mark_restart_requested();
                return Ok(TickOutcome::NeedsRestart);
            }
            Some(Progress::Pending) => {}
            None => return Ok(TickOutcome::NeedsRestart),
        }

        if primary
            .send_measurements(snapshot, include_non_players)
            .is_none()
        {
            return Ok(TickOutcome::NeedsRestart);
        }

        match primary.read_control(control_mode) {
            Some(Progress::Ready(control)) => {
                if let Some(player) = self.player.as_mut() {
                    player.apply_control(control);
                }
            }
            // No new control this frame; the agent keeps the last one.
            Some(Progress::Pending) => {}
            None => return Ok(TickOutcome::NeedsRestart),
        }

        for slot in &mut self.additional {
            if !slot.is_live() {
                continue;
            }
            slot.begin_ticking();
            match slot.poll_new_episode(&self.settings) {
                Some(Progress::Ready(())) => {
                    // Observers cannot restart the session.
                    debug!(slot = %slot.id(), "observer requested a new episode, ignored");
                    continue;
                }
                Some(Progress::Pending) => {}
                None => continue,
            }
            if slot
                .send_measurements(snapshot, include_non_players)
                .is_none()
            {
                continue;
            }
            // Observer control input is consumed, then discarded.
            let _ = slot.read_control(IoMode::NonBlocking);
        }

        Ok(TickOutcome::Continue)
    }

    pub fn is_primary_live(&self) -> bool {
        self.primary.as_ref().is_some_and(|slot| slot.is_live())
    }

    pub fn primary_phase(&self) -> Option<SlotPhase> {
        self.primary.as_ref().map(|slot| slot.phase())
    }

    pub fn additional_phases(&self) -> Vec<SlotPhase> {
        self.additional.iter().map(|slot| slot.phase()).collect()
    }

    pub fn live_additional(&self) -> usize {
        self.additional.iter().filter(|slot| slot.is_live()).count()
    }

    pub fn settings(&self) -> &SimulatorSettings {
        &self.settings
    }
}
