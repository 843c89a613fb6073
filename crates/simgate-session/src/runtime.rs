//! Demo host loop for the `simgate` binary.
//!
//! Plays the role of the simulation: drives the controller through the
//! lifecycle hooks, synthesizes a measurement snapshot per frame from a
//! trivial kinematic vehicle, and rebuilds the session whenever the
//! controller reports that the primary connection needs a restart.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use simgate_core::SimulatorSettings;
use simgate_core::types::{Control, ControlSink, MeasurementSnapshot, PlayerState, SpawnPoint};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::{SessionController, TickOutcome};
use crate::scripted::{ScriptHandle, ScriptedFactory};

/// Trivial kinematic vehicle used as the demo control sink.
#[derive(Debug, Default)]
pub struct DemoVehicle {
    pub state: PlayerState,
    pub control: Control,
}

impl DemoVehicle {
    /// Integrate one frame of motion from the last applied control.
    pub fn step(&mut self, delta_seconds: f64) {
        let accel = self.control.throttle * 8.0 - self.control.brake * 12.0;
        self.state.forward_speed = (self.state.forward_speed + accel * delta_seconds).max(0.0);
        self.state.transform.rotation.yaw +=
            self.control.steer * self.state.forward_speed * delta_seconds * 4.0;
        let yaw = self.state.transform.rotation.yaw.to_radians();
        let distance = self.state.forward_speed * delta_seconds;
        self.state.transform.location.x += distance * yaw.cos();
        self.state.transform.location.y += distance * yaw.sin();
    }
}

impl ControlSink for DemoVehicle {
    fn apply_control(&mut self, control: Control) {
        self.control = control;
    }
}

type SharedVehicle = Arc<Mutex<DemoVehicle>>;

#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    /// Number of frames to simulate.
    pub ticks: u64,
    /// Frame interval.
    pub frame: Duration,
}

fn demo_spawn_points() -> Vec<SpawnPoint> {
    vec![
        SpawnPoint::at(0.0, 0.0, 0.0),
        SpawnPoint::at(40.0, 0.0, 0.0),
        SpawnPoint::at(0.0, 40.0, 0.0),
        SpawnPoint::at(-40.0, -40.0, 0.0),
    ]
}

/// Queue a gentle driving sequence onto the scripted primary client.
fn script_demo_driver(handle: &ScriptHandle, ticks: u64) {
    for i in 0..ticks {
        handle.push_control(Control {
            throttle: 0.6,
            steer: 0.3 * (i as f64 / 30.0).sin(),
            ..Control::default()
        });
    }
}

fn start_session(
    controller: &mut SessionController<ScriptedFactory, SharedVehicle>,
    settings: &SimulatorSettings,
    spots: &[SpawnPoint],
    vehicle: &SharedVehicle,
) -> anyhow::Result<()> {
    controller.initialize(settings);
    let start = controller.choose_player_start(spots)?;
    {
        let mut v = vehicle.lock().unwrap();
        v.state = PlayerState {
            transform: start.transform,
            ..PlayerState::default()
        };
    }
    controller.register_player(Arc::clone(vehicle))?;
    controller.begin_play()?;
    info!(
        x = start.transform.location.x,
        y = start.transform.location.y,
        live_observers = controller.live_additional(),
        "episode started"
    );
    Ok(())
}

/// Run the demo episode loop until the frame budget is spent or the token
/// is cancelled.
pub async fn run_demo(
    settings: SimulatorSettings,
    opts: DemoOptions,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    settings.log();

    let mut factory = ScriptedFactory::new();
    let primary_script = factory.script(settings.server.world_port);
    script_demo_driver(&primary_script, opts.ticks);

    let vehicle: SharedVehicle = Arc::new(Mutex::new(DemoVehicle::default()));
    let mut controller = SessionController::new(factory);
    let spots = demo_spawn_points();

    start_session(&mut controller, &settings, &spots, &vehicle)?;

    let mut interval = tokio::time::interval(opts.frame);
    let delta = opts.frame.as_secs_f64();
    let mut frame: u64 = 0;
    while frame < opts.ticks {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("cancelled, shutting down");
                break;
            }
            _ = interval.tick() => {}
        }
        frame += 1;

        // Halfway through, have the scripted client ask for a new episode to
        // exercise the restart path.
        if opts.ticks >= 20 && frame == opts.ticks / 2 {
            primary_script.request_new_episode();
        }

        let snapshot = {
            let mut v = vehicle.lock().unwrap();
            v.step(delta);
            MeasurementSnapshot::new(frame, (frame as u128 * opts.frame.as_millis()) as u32, v.state.clone())
        };

        match controller.tick(delta, &snapshot)? {
            TickOutcome::Continue => {
                debug!(
                    frame,
                    speed = snapshot.player.forward_speed,
                    "frame complete"
                );
            }
            TickOutcome::NeedsRestart => {
                info!(frame, "restarting level");
                start_session(&mut controller, &settings, &spots, &vehicle)?;
            }
        }
    }

    info!(frames = frame, "demo finished");
    Ok(())
}
