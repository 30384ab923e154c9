/**
 * Drive Loop
 *
 * Brain-side control loop that:
 * 1. Holds the latest human input, autopilot output and drive mode
 * 2. Arbitrates them once per tick
 * 3. Sends the result through the transmitter
 *
 * Input sources (joystick, inference, console) update the shared state from
 * their own threads; the loop only ever reads the latest values.
 */

use std::io::Write;
use std::sync::{Arc, PoisonError, RwLock, atomic::{AtomicBool, Ordering}};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::control::{ControlMode, DriveMode, NormalizedControl, PilotControl};
use crate::error::LinkError;
use crate::transmitter::Transmitter;

/// Latest inputs seen by the loop
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveInputs {
    pub mode: ControlMode,
    pub user: NormalizedControl,
    pub pilot: PilotControl,
}

pub struct DriveLoop {
    drive_mode: DriveMode,
    period: Duration,
    running: Arc<AtomicBool>,
    inputs: Arc<RwLock<DriveInputs>>,
}

impl DriveLoop {
    pub fn new(drive_mode: DriveMode, loop_hz: u32) -> Self {
        Self {
            drive_mode,
            period: Duration::from_secs(1) / loop_hz.max(1),
            running: Arc::new(AtomicBool::new(true)),
            inputs: Arc::new(RwLock::new(DriveInputs::default())),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn inputs(&self) -> DriveInputs {
        *self.inputs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut DriveInputs)) {
        let mut inputs = self.inputs.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut inputs);
    }

    pub fn set_mode(&self, mode: ControlMode) {
        self.update(|i| i.mode = mode);
    }

    pub fn set_user(&self, user: NormalizedControl) {
        self.update(|i| i.user = user);
    }

    pub fn set_angle(&self, angle: f64) {
        self.update(|i| i.user.angle = angle);
    }

    pub fn set_throttle(&self, throttle: f64) {
        self.update(|i| i.user.throttle = throttle);
    }

    pub fn set_brake(&self, brake: f64) {
        self.update(|i| i.user.brake = brake);
    }

    pub fn set_pilot(&self, pilot: PilotControl) {
        self.update(|i| i.pilot = pilot);
    }

    /// Hand control back to the user with everything centered
    pub fn stop(&self) {
        self.update(|i| *i = DriveInputs::default());
    }

    /// The control triple the next tick would send
    pub fn effective_control(&self) -> NormalizedControl {
        let inputs = self.inputs();
        self.drive_mode.arbitrate(inputs.mode, &inputs.user, &inputs.pilot)
    }

    /// False once `shutdown()` was called or the loop exited
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the loop to exit after the current tick
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run until `shutdown()` or a failed send. The transmitter is always shut
    /// down on the way out, so the actuator ends in neutral. A loop that was
    /// shut down stays down: running it again only neutralizes.
    pub fn run<P: Write>(&self, mut transmitter: Transmitter<P>) -> Result<u64, LinkError> {
        info!(period_ms = self.period.as_millis() as u64, "drive loop started");

        let mut ticks = 0u64;
        let result = loop {
            if !self.running.load(Ordering::SeqCst) {
                break Ok(ticks);
            }

            let started = Instant::now();
            let control = self.effective_control();
            if let Err(e) = transmitter.send_control(&control) {
                error!("send failed, stopping drive loop: {}", e);
                break Err(e);
            }
            ticks += 1;
            debug!(ticks, angle = control.angle, throttle = control.throttle, brake = control.brake, "tick");

            if let Some(rest) = self.period.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        };

        self.running.store(false, Ordering::SeqCst);
        let closed = transmitter.shutdown();
        info!(ticks, "drive loop stopped");

        let ticks = result?;
        closed?;
        Ok(ticks)
    }

    /// Run on a background thread
    pub fn start_background<P: Write + Send + 'static>(
        self: Arc<Self>,
        transmitter: Transmitter<P>,
    ) -> thread::JoinHandle<Result<u64, LinkError>> {
        thread::spawn(move || self.run(transmitter))
    }
}
