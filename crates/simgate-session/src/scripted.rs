//! Scripted client transport.
//!
//! A first-class [`ClientTransport`] implementation driven by per-operation
//! outcome queues instead of a socket. It backs the test suite and the demo
//! episode loop in the `simgate` binary. Outcomes can be queued up front or
//! pushed mid-run through a [`ScriptHandle`]; with empty queues the scripted
//! client behaves like a well-behaved silent peer (connects, negotiates,
//! picks spawn 0, acknowledges everything, never requests a new episode).
//!
//! Every invocation is recorded in a shared [`CallLog`] together with the
//! blocking mode the caller selected, which is what the fault-isolation
//! tests assert against.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use simgate_core::transport::{ClientTransport, Endpoint, IoMode, Progress, TransportFactory};
use simgate_core::types::{Control, MeasurementSnapshot, SpawnPoint};
use simgate_core::{SimulatorSettings, TransportError};

/// Protocol operation, for call-log assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Connect,
    NegotiateEpisode,
    SendSceneDescription,
    ReadEpisodeStart,
    SendEpisodeReady,
    SendMeasurements,
    ReadControl,
}

/// One recorded transport invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallRecord {
    pub port: u16,
    pub op: Op,
    pub mode: IoMode,
}

/// Shared, ordered record of every transport call across all slots.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<CallRecord>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, port: u16, op: Op, mode: IoMode) {
        self.calls.lock().unwrap().push(CallRecord { port, op, mode });
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops_for(&self, port: u16) -> Vec<Op> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.port == port)
            .map(|c| c.op)
            .collect()
    }

    pub fn count_for(&self, port: u16) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.port == port).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// A scripted outcome for one future call.
#[derive(Debug, Clone)]
enum Planned<T> {
    Succeed(T),
    Pending,
    Fail,
}

#[derive(Debug, Default)]
struct Script {
    connect: VecDeque<Planned<()>>,
    negotiate: VecDeque<Planned<()>>,
    scene: VecDeque<Planned<()>>,
    episode_start: VecDeque<Planned<usize>>,
    episode_ready: VecDeque<Planned<()>>,
    measurements: VecDeque<Planned<()>>,
    control: VecDeque<Planned<Control>>,
}

/// Handle for queueing outcomes onto a scripted transport, before or during
/// a run.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
}

impl ScriptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(&self) -> &Self {
        self.script.lock().unwrap().connect.push_back(Planned::Fail);
        self
    }

    pub fn fail_negotiation(&self) -> &Self {
        self.script.lock().unwrap().negotiate.push_back(Planned::Fail);
        self
    }

    /// Queue a new-episode request: the next negotiation call (the per-tick
    /// poll included) reports one.
    pub fn request_new_episode(&self) -> &Self {
        self.script
            .lock()
            .unwrap()
            .negotiate
            .push_back(Planned::Succeed(()));
        self
    }

    pub fn fail_scene_send(&self) -> &Self {
        self.script.lock().unwrap().scene.push_back(Planned::Fail);
        self
    }

    /// Queue the spawn index the client answers the next scene description
    /// with.
    pub fn select_start(&self, index: usize) -> &Self {
        self.script
            .lock()
            .unwrap()
            .episode_start
            .push_back(Planned::Succeed(index));
        self
    }

    pub fn fail_episode_start(&self) -> &Self {
        self.script
            .lock()
            .unwrap()
            .episode_start
            .push_back(Planned::Fail);
        self
    }

    pub fn fail_episode_ready(&self) -> &Self {
        self.script
            .lock()
            .unwrap()
            .episode_ready
            .push_back(Planned::Fail);
        self
    }

    pub fn fail_measurements(&self) -> &Self {
        self.script
            .lock()
            .unwrap()
            .measurements
            .push_back(Planned::Fail);
        self
    }

    pub fn push_control(&self, control: Control) -> &Self {
        self.script
            .lock()
            .unwrap()
            .control
            .push_back(Planned::Succeed(control));
        self
    }

    pub fn control_pending(&self) -> &Self {
        self.script.lock().unwrap().control.push_back(Planned::Pending);
        self
    }

    pub fn fail_control(&self) -> &Self {
        self.script.lock().unwrap().control.push_back(Planned::Fail);
        self
    }
}

pub struct ScriptedTransport {
    endpoint: Endpoint,
    log: CallLog,
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new(endpoint: Endpoint, log: CallLog) -> Self {
        Self::with_handle(endpoint, log, ScriptHandle::new())
    }

    pub fn with_handle(endpoint: Endpoint, log: CallLog, handle: ScriptHandle) -> Self {
        Self {
            endpoint,
            log,
            script: handle.script,
        }
    }

    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle {
            script: Arc::clone(&self.script),
        }
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }
}

impl ClientTransport for ScriptedTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.log.record(self.endpoint.port, Op::Connect, IoMode::Blocking);
        match self.script.lock().unwrap().connect.pop_front() {
            Some(Planned::Fail) => Err(TransportError::Connect(format!(
                "scripted connect refusal on port {}",
                self.endpoint.port
            ))),
            _ => Ok(()),
        }
    }

    fn negotiate_episode(
        &mut self,
        _settings: &SimulatorSettings,
        mode: IoMode,
    ) -> Result<Progress<()>, TransportError> {
        self.log.record(self.endpoint.port, Op::NegotiateEpisode, mode);
        match self.script.lock().unwrap().negotiate.pop_front() {
            Some(Planned::Succeed(())) => Ok(Progress::Ready(())),
            Some(Planned::Pending) => Ok(Progress::Pending),
            Some(Planned::Fail) => Err(TransportError::Negotiation(
                "scripted negotiation failure".into(),
            )),
            // Silent peer: accepts the initial (blocking) negotiation,
            // never spontaneously requests a new episode.
            None => match mode {
                IoMode::Blocking => Ok(Progress::Ready(())),
                IoMode::NonBlocking => Ok(Progress::Pending),
            },
        }
    }

    fn send_scene_description(&mut self, _spots: &[SpawnPoint]) -> Result<(), TransportError> {
        self.log
            .record(self.endpoint.port, Op::SendSceneDescription, IoMode::Blocking);
        match self.script.lock().unwrap().scene.pop_front() {
            Some(Planned::Fail) => Err(TransportError::Protocol(
                "scripted scene send failure".into(),
            )),
            _ => Ok(()),
        }
    }

    fn read_episode_start(&mut self) -> Result<usize, TransportError> {
        self.log
            .record(self.endpoint.port, Op::ReadEpisodeStart, IoMode::Blocking);
        match self.script.lock().unwrap().episode_start.pop_front() {
            Some(Planned::Succeed(index)) => Ok(index),
            Some(Planned::Fail) | Some(Planned::Pending) => Err(TransportError::Protocol(
                "scripted episode start failure".into(),
            )),
            None => Ok(0),
        }
    }

    fn send_episode_ready(&mut self) -> Result<(), TransportError> {
        self.log
            .record(self.endpoint.port, Op::SendEpisodeReady, IoMode::Blocking);
        match self.script.lock().unwrap().episode_ready.pop_front() {
            Some(Planned::Fail) => Err(TransportError::Protocol(
                "scripted episode ready failure".into(),
            )),
            _ => Ok(()),
        }
    }

    fn send_measurements(
        &mut self,
        _snapshot: &MeasurementSnapshot,
        _include_non_players: bool,
    ) -> Result<(), TransportError> {
        self.log
            .record(self.endpoint.port, Op::SendMeasurements, IoMode::Blocking);
        match self.script.lock().unwrap().measurements.pop_front() {
            Some(Planned::Fail) => Err(TransportError::Protocol(
                "scripted measurements failure".into(),
            )),
            _ => Ok(()),
        }
    }

    fn read_control(&mut self, mode: IoMode) -> Result<Progress<Control>, TransportError> {
        self.log.record(self.endpoint.port, Op::ReadControl, mode);
        match self.script.lock().unwrap().control.pop_front() {
            Some(Planned::Succeed(control)) => Ok(Progress::Ready(control)),
            Some(Planned::Pending) => Ok(Progress::Pending),
            Some(Planned::Fail) => Err(TransportError::Protocol(
                "scripted control failure".into(),
            )),
            // A blocking read on a silent peer waits out the timeout and
            // delivers a neutral control; non-blocking reports no data.
            None => match mode {
                IoMode::Blocking => Ok(Progress::Ready(Control::default())),
                IoMode::NonBlocking => Ok(Progress::Pending),
            },
        }
    }
}

/// Factory handing the controller scripted transports by endpoint port.
///
/// `script(port)` registers the script for the next transport opened on that
/// port and returns its handle; unscripted ports get silent-peer defaults.
#[derive(Default)]
pub struct ScriptedFactory {
    log: CallLog,
    pending: HashMap<u16, VecDeque<ScriptHandle>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn script(&mut self, port: u16) -> ScriptHandle {
        let handle = ScriptHandle::new();
        self.pending
            .entry(port)
            .or_default()
            .push_back(handle.clone());
        handle
    }
}

impl TransportFactory for ScriptedFactory {
    type Transport = ScriptedTransport;

    fn open(&mut self, endpoint: Endpoint) -> ScriptedTransport {
        let handle = self
            .pending
            .get_mut(&endpoint.port)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_default();
        ScriptedTransport::with_handle(endpoint, self.log.clone(), handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new(port, Duration::from_millis(10))
    }

    #[test]
    fn silent_peer_defaults() {
        let log = CallLog::new();
        let mut t = ScriptedTransport::new(endpoint(2000), log.clone());
        assert!(t.connect().is_ok());
        let settings = SimulatorSettings::default();
        assert_eq!(
            t.negotiate_episode(&settings, IoMode::Blocking).unwrap(),
            Progress::Ready(())
        );
        assert_eq!(
            t.negotiate_episode(&settings, IoMode::NonBlocking).unwrap(),
            Progress::Pending
        );
        assert_eq!(t.read_episode_start().unwrap(), 0);
        assert_eq!(
            t.read_control(IoMode::NonBlocking).unwrap(),
            Progress::Pending
        );
        assert_eq!(
            t.read_control(IoMode::Blocking).unwrap(),
            Progress::Ready(Control::default())
        );
    }

    #[test]
    fn scripted_outcomes_are_consumed_in_order() {
        let mut t = ScriptedTransport::new(endpoint(2000), CallLog::new());
        let handle = t.handle();
        handle.control_pending().push_control(Control {
            throttle: 0.5,
            ..Control::default()
        });
        assert_eq!(
            t.read_control(IoMode::NonBlocking).unwrap(),
            Progress::Pending
        );
        match t.read_control(IoMode::NonBlocking).unwrap() {
            Progress::Ready(c) => assert_eq!(c.throttle, 0.5),
            Progress::Pending => panic!("expected scripted control"),
        }
    }

    #[test]
    fn call_log_records_port_op_and_mode() {
        let log = CallLog::new();
        let mut t = ScriptedTransport::new(endpoint(2003), log.clone());
        t.connect().unwrap();
        t.read_control(IoMode::NonBlocking).unwrap();
        assert_eq!(
            log.calls(),
            vec![
                CallRecord {
                    port: 2003,
                    op: Op::Connect,
                    mode: IoMode::Blocking
                },
                CallRecord {
                    port: 2003,
                    op: Op::ReadControl,
                    mode: IoMode::NonBlocking
                },
            ]
        );
    }

    #[test]
    fn factory_attaches_scripts_by_port() {
        let mut factory = ScriptedFactory::new();
        factory.script(2003).fail_connect();
        let mut scripted = factory.open(endpoint(2003));
        assert!(scripted.connect().is_err());
        // Unscripted port gets silent-peer defaults.
        let mut plain = factory.open(endpoint(2006));
        assert!(plain.connect().is_ok());
    }
}
