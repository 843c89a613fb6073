//! Connection slots: ownership of one client transport plus its liveness.
//!
//! A slot maps every transport error to "mark self dead, propagate no
//! further". Once dead, every call is a guaranteed no-op that never touches
//! the transport again, so repeated faults cost nothing per tick.

use std::fmt;

use simgate_core::lifecycle::SlotPhase;
use simgate_core::transport::{ClientTransport, IoMode, Progress};
use simgate_core::types::{Control, MeasurementSnapshot, SpawnPoint};
use simgate_core::{SimulatorSettings, TransportError};
use tracing::warn;

/// Identity of a slot within the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotId {
    Primary,
    Additional(usize),
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotId::Primary => write!(f, "primary"),
            SlotId::Additional(i) => write!(f, "additional #{i}"),
        }
    }
}

/// Explicit liveness state. A dead slot's transport is dropped outright so
/// it can never be retried by accident.
enum SlotState<T> {
    Live(T),
    Dead,
}

pub struct ConnectionSlot<T> {
    id: SlotId,
    state: SlotState<T>,
    phase: SlotPhase,
}

impl<T: ClientTransport> ConnectionSlot<T> {
    pub fn new(id: SlotId, transport: T) -> Self {
        Self {
            id,
            state: SlotState::Live(transport),
            phase: SlotPhase::Disconnected,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn phase(&self) -> SlotPhase {
        self.phase
    }

    /// Whether the slot still participates in protocol operations.
    pub fn is_live(&self) -> bool {
        self.phase.is_live()
    }

    /// Whether the underlying connection is still intact. A slot whose
    /// primary client requested a restart keeps its transport; a faulted
    /// slot does not.
    pub fn has_transport(&self) -> bool {
        matches!(self.state, SlotState::Live(_))
    }

    fn advance(&mut self, next: SlotPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal phase transition {:?} -> {next:?}",
            self.phase
        );
        if self.phase.can_advance_to(next) {
            self.phase = next;
        }
    }

    fn fault(&mut self, during: &'static str, err: &TransportError) {
        warn!(slot = %self.id, error = %err, "{during} failed, slot disabled");
        self.state = SlotState::Dead;
        self.phase = SlotPhase::Faulted;
    }

    /// Run one protocol call if the slot is live; on error, mark dead and
    /// swallow. `None` means skipped or faulted.
    fn protocol<R>(
        &mut self,
        during: &'static str,
        op: impl FnOnce(&mut T) -> Result<R, TransportError>,
    ) -> Option<R> {
        if !self.is_live() {
            return None;
        }
        let result = match &mut self.state {
            SlotState::Live(transport) => op(transport),
            SlotState::Dead => return None,
        };
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.fault(during, &err);
                None
            }
        }
    }

    /// Connect and run the blocking episode negotiation. Returns whether the
    /// slot came up live.
    pub fn establish(&mut self, settings: &SimulatorSettings) -> bool {
        if !self.is_live() {
            return false;
        }
        self.advance(SlotPhase::Connecting);
        if self.protocol("connect", |t| t.connect()).is_none() {
            return false;
        }
        self.advance(SlotPhase::NegotiatingEpisode);
        match self.protocol("episode negotiation", |t| {
            t.negotiate_episode(settings, IoMode::Blocking)
        }) {
            Some(Progress::Ready(())) => true,
            Some(Progress::Pending) => {
                // A blocking negotiation has no no-data outcome.
                self.fault(
                    "episode negotiation",
                    &TransportError::Negotiation("blocking negotiation returned no data".into()),
                );
                false
            }
            None => false,
        }
    }

    /// Reset the episode machine on an intact connection: the client already
    /// negotiated the next episode through its new-episode request.
    pub fn reset_for_new_episode(&mut self) {
        if self.has_transport() {
            self.phase = SlotPhase::NegotiatingEpisode;
        }
    }

    /// Blocking scene-description send followed by the blocking selection
    /// read. Returns the client's chosen spawn index, unvalidated.
    pub fn exchange_scene(&mut self, spots: &[SpawnPoint]) -> Option<usize> {
        if !self.is_live() {
            return None;
        }
        self.advance(SlotPhase::AwaitingSceneSelection);
        self.protocol("scene description send", |t| t.send_scene_description(spots))?;
        self.protocol("episode start read", |t| t.read_episode_start())
    }

    /// Blocking "episode ready" acknowledgment.
    pub fn acknowledge_ready(&mut self) -> Option<()> {
        if !self.is_live() {
            return None;
        }
        self.protocol("episode ready send", |t| t.send_episode_ready())?;
        self.advance(SlotPhase::Ready);
        Some(())
    }

    /// First tick after `Ready` moves the slot into `Ticking`.
    pub fn begin_ticking(&mut self) {
        if self.phase == SlotPhase::Ready {
            self.advance(SlotPhase::Ticking);
        }
    }

    /// Non-blocking check for a new-episode request.
    pub fn poll_new_episode(&mut self, settings: &SimulatorSettings) -> Option<Progress<()>> {
        self.protocol("new episode poll", |t| {
            t.negotiate_episode(settings, IoMode::NonBlocking)
        })
    }

    pub fn send_measurements(
        &mut self,
        snapshot: &MeasurementSnapshot,
        include_non_players: bool,
    ) -> Option<()> {
        self.protocol("measurements send", |t| {
            t.send_measurements(snapshot, include_non_players)
        })
    }

    pub fn read_control(&mut self, mode: IoMode) -> Option<Progress<Control>> {
        self.protocol("control read", |t| t.read_control(mode))
    }

    /// The primary client asked for a new episode; the session restarts.
    /// The connection itself stays intact.
    pub fn mark_restart_requested(&mut self) {
        self.advance(SlotPhase::RestartRequested);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{CallLog, ScriptHandle, ScriptedTransport};
    use simgate_core::transport::Endpoint;
    use std::time::Duration;

    fn slot(log: &CallLog) -> (ConnectionSlot<ScriptedTransport>, ScriptHandle) {
        let transport =
            ScriptedTransport::new(Endpoint::new(2000, Duration::from_millis(10)), log.clone());
        let handle = transport.handle();
        (ConnectionSlot::new(SlotId::Primary, transport), handle)
    }

    #[test]
    fn establish_walks_the_lifecycle() {
        let log = CallLog::new();
        let (mut slot, _handle) = slot(&log);
        let settings = SimulatorSettings::default();

        assert_eq!(slot.phase(), SlotPhase::Disconnected);
        assert!(slot.establish(&settings));
        assert_eq!(slot.phase(), SlotPhase::NegotiatingEpisode);

        assert_eq!(slot.exchange_scene(&[SpawnPoint::default()]), Some(0));
        assert_eq!(slot.phase(), SlotPhase::AwaitingSceneSelection);

        assert_eq!(slot.acknowledge_ready(), Some(()));
        assert_eq!(slot.phase(), SlotPhase::Ready);

        slot.begin_ticking();
        assert_eq!(slot.phase(), SlotPhase::Ticking);

        slot.mark_restart_requested();
        assert_eq!(slot.phase(), SlotPhase::RestartRequested);
        assert!(!slot.is_live());
        assert!(slot.has_transport());
    }

    #[test]
    fn faulted_slot_never_touches_the_transport_again() {
        let log = CallLog::new();
        let (mut slot, handle) = slot(&log);
        handle.fail_connect();
        let settings = SimulatorSettings::default();

        assert!(!slot.establish(&settings));
        assert_eq!(slot.phase(), SlotPhase::Faulted);
        assert!(!slot.has_transport());

        let calls = log.count_for(2000);
        assert!(slot.poll_new_episode(&settings).is_none());
        assert!(slot
            .send_measurements(&MeasurementSnapshot::new(0, 0, Default::default()), false)
            .is_none());
        assert!(slot.read_control(IoMode::NonBlocking).is_none());
        assert!(slot.exchange_scene(&[SpawnPoint::default()]).is_none());
        assert!(slot.acknowledge_ready().is_none());
        assert_eq!(log.count_for(2000), calls);
    }

    #[test]
    fn mid_episode_fault_drops_the_transport() {
        let log = CallLog::new();
        let (mut slot, handle) = slot(&log);
        let settings = SimulatorSettings::default();
        slot.establish(&settings);

        handle.fail_measurements();
        let snapshot = MeasurementSnapshot::new(1, 16, Default::default());
        assert!(slot.send_measurements(&snapshot, true).is_none());
        assert_eq!(slot.phase(), SlotPhase::Faulted);
        assert!(!slot.has_transport());
    }

    #[test]
    fn slot_id_display() {
        assert_eq!(SlotId::Primary.to_string(), "primary");
        assert_eq!(SlotId::Additional(1).to_string(), "additional #1");
    }
}
