/**
 * Serial Receiver
 *
 * Actuator-side end of the link. A single blocking loop that:
 * 1. Reads one frame from the serial port (bounded by the port timeout)
 * 2. Decodes and re-clamps it to hardware-safe pulse widths
 * 3. Drives the three PWM outputs and the two direction relays
 *
 * Bad input never stops the loop; only the shutdown token does. On the way
 * out the outputs are forced to neutral before the hardware is released.
 */

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use serialport::SerialPort;
use tracing::{debug, error, info, warn};

use crate::actuator::{ActuatorBackend, PwmChannel, RelayChannel};
use crate::error::LinkError;
use crate::logging::WIRE_TARGET;
use crate::uart::{open_link, ActuationFrame, FrameDecoder, WireFormat, FRAMED_SIZE, PACKET_SIZE};

/// Bytes a framed read may consume without finding a valid frame before the
/// loop gets control back
const MAX_SCAN_BYTES: usize = 8 * FRAMED_SIZE;

/// Cancellation handle for the receive loop, checked between frame reads.
/// Clone it into a signal handler; cancelling is idempotent.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Running,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub frames_applied: u64,
    pub short_reads: u64,
    pub malformed: u64,
    pub unknown_gear: u64,
    pub io_errors: u64,
    pub failsafe_trips: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverOptions {
    pub format: WireFormat,
    /// Neutralize outputs after this many consecutive dropped frames.
    /// `None` keeps the last applied outputs for as long as the link is silent.
    pub failsafe_after: Option<u32>,
}

pub struct Receiver<R: Read, B: ActuatorBackend> {
    port: R,
    backend: B,
    options: ReceiverOptions,
    state: ReceiverState,
    decoder: FrameDecoder,
    stats: ReceiverStats,
    consecutive_drops: u32,
}

impl<B: ActuatorBackend> Receiver<Box<dyn SerialPort>, B> {
    /// Open the serial device (fixed baud, settle delay included)
    pub fn open(path: &str, backend: B, options: ReceiverOptions) -> Result<Self, LinkError> {
        let port = open_link(path)?;
        Self::new(port, backend, options)
    }
}

impl<R: Read, B: ActuatorBackend> Receiver<R, B> {
    /// Take ownership of the stream and outputs. Outputs start in the
    /// safe-neutral state.
    pub fn new(port: R, backend: B, options: ReceiverOptions) -> Result<Self, LinkError> {
        let mut receiver = Self {
            port,
            backend,
            options,
            state: ReceiverState::Running,
            decoder: FrameDecoder::new(),
            stats: ReceiverStats::default(),
            consecutive_drops: 0,
        };
        receiver.neutralize()?;
        info!(format = %options.format, failsafe_after = ?options.failsafe_after, "receiver ready");
        Ok(receiver)
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Receive until the token is cancelled, then shut down.
    pub fn run(&mut self, token: &ShutdownToken) -> Result<(), LinkError> {
        info!("receive loop started");

        while self.state == ReceiverState::Running && !token.is_cancelled() {
            // errors are logged and counted in poll_once
            let _ = self.poll_once();
        }

        info!("shutdown requested");
        self.shutdown()
    }

    /// One loop iteration: read, decode, clamp, apply.
    pub fn poll_once(&mut self) -> Result<ActuationFrame, LinkError> {
        if self.state != ReceiverState::Running {
            return Err(LinkError::Backend("receiver is shutting down".to_string()));
        }

        let result = self.receive_frame();
        self.record(&result);
        result
    }

    fn receive_frame(&mut self) -> Result<ActuationFrame, LinkError> {
        let payload = match self.options.format {
            WireFormat::Raw => self.read_raw()?,
            WireFormat::Framed => self.read_framed()?,
        };

        let decoded = ActuationFrame::decode(&payload)?;
        debug!(
            target: WIRE_TARGET,
            steering = decoded.steering_pulse,
            throttle = decoded.throttle_pulse,
            brake = decoded.brake_pulse,
            gear = decoded.gear_state,
            "rx"
        );

        // never trust the sender's clamping
        let frame = decoded.clamped();
        self.apply(&frame)?;
        Ok(frame)
    }

    fn read_raw(&mut self) -> Result<[u8; PACKET_SIZE], LinkError> {
        let expected = self.options.format.frame_size();
        let mut buf = [0u8; PACKET_SIZE];
        let mut got = 0;

        while got < PACKET_SIZE {
            match self.port.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(ref e) if e.kind() == ErrorKind::TimedOut => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        if got < PACKET_SIZE {
            return Err(LinkError::ShortRead { got, expected });
        }
        Ok(buf)
    }

    fn read_framed(&mut self) -> Result<[u8; PACKET_SIZE], LinkError> {
        let expected = self.options.format.frame_size();
        let mut read_buf = [0u8; 64];
        let mut scanned = 0;
        let discarded_before = self.decoder.discarded();

        loop {
            if let Some(payload) = self.decoder.try_parse_frame() {
                let skipped = self.decoder.discarded() - discarded_before;
                if skipped > 0 {
                    warn!(skipped, "resynchronized on frame boundary");
                }
                return Ok(payload);
            }

            if scanned >= MAX_SCAN_BYTES {
                return Err(LinkError::MalformedPacket(format!(
                    "no valid frame in {} bytes",
                    scanned
                )));
            }

            match self.port.read(&mut read_buf) {
                Ok(0) => {
                    return Err(LinkError::ShortRead { got: self.decoder.pending(), expected });
                }
                Ok(n) => {
                    scanned += n;
                    self.decoder.push(&read_buf[..n]);
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(LinkError::ShortRead { got: self.decoder.pending(), expected });
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Drive outputs from an already clamped frame. An unknown gear state
    /// still updates the pulses but leaves the relays where they were.
    fn apply(&mut self, frame: &ActuationFrame) -> Result<(), LinkError> {
        self.set_pulses(frame)?;

        let gear = frame
            .gear()
            .ok_or(LinkError::UnknownGearState(frame.gear_state))?;
        let (forward, reverse) = gear.relay_levels();
        self.backend.set_digital(RelayChannel::Forward, forward)?;
        self.backend.set_digital(RelayChannel::Reverse, reverse)?;
        Ok(())
    }

    fn set_pulses(&mut self, frame: &ActuationFrame) -> Result<(), LinkError> {
        let pulses = [frame.steering_pulse, frame.throttle_pulse, frame.brake_pulse];
        for (channel, pulse) in PwmChannel::ALL.into_iter().zip(pulses) {
            let pulse = u16::try_from(pulse)
                .map_err(|_| LinkError::MalformedPacket(format!("negative pulse {}", pulse)))?;
            self.backend.set_pulse_width(channel, pulse)?;
        }
        Ok(())
    }

    /// Failsafe outputs: neutral pulses, both relays off
    fn neutralize(&mut self) -> Result<(), LinkError> {
        self.set_pulses(&ActuationFrame::neutral())?;
        for relay in RelayChannel::ALL {
            self.backend.set_digital(relay, false)?;
        }
        Ok(())
    }

    fn record(&mut self, result: &Result<ActuationFrame, LinkError>) {
        let dropped = match result {
            Ok(_) => {
                self.stats.frames_applied += 1;
                false
            }
            Err(LinkError::ShortRead { got, expected }) => {
                self.stats.short_reads += 1;
                warn!(got, expected, "incomplete frame dropped");
                true
            }
            Err(LinkError::MalformedPacket(reason)) => {
                self.stats.malformed += 1;
                warn!(%reason, "malformed frame dropped");
                true
            }
            Err(LinkError::UnknownGearState(gear)) => {
                self.stats.unknown_gear += 1;
                warn!(gear, "unknown gear state, relays unchanged");
                false
            }
            Err(LinkError::Io(e)) => {
                self.stats.io_errors += 1;
                error!("serial read failed: {}", e);
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        };

        if !dropped {
            self.consecutive_drops = 0;
            return;
        }

        self.consecutive_drops = self.consecutive_drops.saturating_add(1);
        if Some(self.consecutive_drops) == self.options.failsafe_after {
            warn!(drops = self.consecutive_drops, "link lost, outputs to neutral");
            self.stats.failsafe_trips += 1;
            if let Err(e) = self.neutralize() {
                error!("failsafe neutralize failed: {}", e);
            }
        }
    }

    /// Stop receiving, force neutral outputs, then release the hardware.
    /// Later calls do nothing.
    pub fn shutdown(&mut self) -> Result<(), LinkError> {
        if self.state == ReceiverState::ShuttingDown {
            return Ok(());
        }
        self.state = ReceiverState::ShuttingDown;
        self.decoder.clear();

        info!("shutting down, outputs to neutral");
        let neutral = self.neutralize();
        let released = self.backend.release();
        info!(stats = ?self.stats, "receiver stopped");

        neutral.and(released)
    }
}

impl<R: Read, B: ActuatorBackend> Drop for Receiver<R, B> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("shutdown on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use crate::actuator::{BackendEvent, SimulatedBackend};
    use crate::control::GearState;

    /// Serial stand-in: hands out scripted chunks, reports a timeout for
    /// `None`, and cancels the token once the script runs dry.
    struct ScriptedPort {
        chunks: VecDeque<Option<Vec<u8>>>,
        token: ShutdownToken,
    }

    impl ScriptedPort {
        fn new(token: &ShutdownToken, chunks: Vec<Option<Vec<u8>>>) -> Self {
            Self { chunks: chunks.into(), token: token.clone() }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Some(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push_front(Some(chunk.split_off(n)));
                    }
                    Ok(n)
                }
                Some(None) => Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
                None => {
                    self.token.cancel();
                    Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"))
                }
            }
        }
    }

    fn raw(frame: ActuationFrame) -> Option<Vec<u8>> {
        Some(frame.encode().to_vec())
    }

    fn framed(frame: ActuationFrame) -> Option<Vec<u8>> {
        Some(WireFormat::Framed.encode(&frame))
    }

    fn receiver(
        token: &ShutdownToken,
        format: WireFormat,
        chunks: Vec<Option<Vec<u8>>>,
    ) -> Receiver<ScriptedPort, SimulatedBackend> {
        let options = ReceiverOptions { format, failsafe_after: None };
        Receiver::new(ScriptedPort::new(token, chunks), SimulatedBackend::new(), options).unwrap()
    }

    fn outputs(rx: &Receiver<ScriptedPort, SimulatedBackend>) -> ((Option<u16>, Option<u16>, Option<u16>), (bool, bool)) {
        (rx.backend().pulses(), rx.backend().relays())
    }

    #[test]
    fn test_starts_neutral() {
        let token = ShutdownToken::new();
        let rx = receiver(&token, WireFormat::Raw, vec![]);
        assert_eq!(outputs(&rx), ((Some(1500), Some(1000), Some(1948)), (false, false)));
        assert_eq!(rx.state(), ReceiverState::Running);
    }

    #[test]
    fn test_applies_forward_frame() {
        let token = ShutdownToken::new();
        let frame = ActuationFrame::new(1835, 2000, 1135, GearState::Drive);
        let mut rx = receiver(&token, WireFormat::Raw, vec![raw(frame)]);

        assert_eq!(rx.poll_once().unwrap(), frame);
        assert_eq!(outputs(&rx), ((Some(1835), Some(2000), Some(1135)), (true, false)));
    }

    #[test]
    fn test_relays_follow_gear() {
        let token = ShutdownToken::new();
        let mut rx = receiver(&token, WireFormat::Raw, vec![
            raw(ActuationFrame::new(1500, 1300, 1135, GearState::Reverse)),
            raw(ActuationFrame::new(1500, 1000, 1135, GearState::Neutral)),
        ]);

        rx.poll_once().unwrap();
        assert_eq!(rx.backend().relays(), (false, true));
        rx.poll_once().unwrap();
        assert_eq!(rx.backend().relays(), (false, false));
    }

    #[test]
    fn test_clamps_untrusted_frame() {
        let token = ShutdownToken::new();
        let wild = ActuationFrame { steering_pulse: 2500, throttle_pulse: -40, brake_pulse: 3000, gear_state: 0 };
        let mut rx = receiver(&token, WireFormat::Raw, vec![raw(wild)]);

        let applied = rx.poll_once().unwrap();
        assert_eq!(applied, ActuationFrame { steering_pulse: 1835, throttle_pulse: 1000, brake_pulse: 1948, gear_state: 0 });
        assert_eq!(rx.backend().pulses(), (Some(1835), Some(1000), Some(1948)));
    }

    #[test]
    fn test_short_read_leaves_outputs_alone() {
        let token = ShutdownToken::new();
        let frame = ActuationFrame::new(1700, 1600, 1200, GearState::Drive);
        let mut rx = receiver(&token, WireFormat::Raw, vec![
            raw(frame),
            Some(vec![1, 2, 3, 4, 5]),
            None,
        ]);

        rx.poll_once().unwrap();
        let before = outputs(&rx);
        let events_before = rx.backend().events().len();

        let err = rx.poll_once().unwrap_err();
        assert!(matches!(err, LinkError::ShortRead { got: 5, expected: 8 }));
        assert_eq!(outputs(&rx), before);
        assert_eq!(rx.backend().events().len(), events_before);
        assert_eq!(rx.stats().short_reads, 1);
    }

    #[test]
    fn test_partial_chunks_are_assembled() {
        let token = ShutdownToken::new();
        let bytes = ActuationFrame::new(1600, 1100, 1300, GearState::Drive).encode();
        let mut rx = receiver(&token, WireFormat::Raw, vec![
            Some(bytes[..3].to_vec()),
            Some(bytes[3..].to_vec()),
        ]);
        assert_eq!(rx.poll_once().unwrap().steering_pulse, 1600);
    }

    #[test]
    fn test_unknown_gear_keeps_relays() {
        let token = ShutdownToken::new();
        let mut rx = receiver(&token, WireFormat::Raw, vec![
            raw(ActuationFrame::new(1500, 1400, 1135, GearState::Drive)),
            raw(ActuationFrame { steering_pulse: 1600, throttle_pulse: 1200, brake_pulse: 1135, gear_state: 7 }),
        ]);

        rx.poll_once().unwrap();
        let err = rx.poll_once().unwrap_err();
        assert!(matches!(err, LinkError::UnknownGearState(7)));
        assert_eq!(rx.backend().relays(), (true, false));
        assert_eq!(rx.backend().pulses(), (Some(1600), Some(1200), Some(1135)));
        assert_eq!(rx.stats().unknown_gear, 1);
    }

    #[test]
    fn test_shutdown_signal_forces_neutral() {
        let token = ShutdownToken::new();
        let mut rx = receiver(&token, WireFormat::Raw, vec![
            raw(ActuationFrame::new(1835, 2000, 1135, GearState::Drive)),
            raw(ActuationFrame::new(1139, 1800, 1135, GearState::Reverse)),
        ]);

        // script runs dry -> token cancelled mid-loop
        rx.run(&token).unwrap();

        assert_eq!(rx.state(), ReceiverState::ShuttingDown);
        assert_eq!(rx.stats().frames_applied, 2);

        let sim = rx.backend();
        assert!(sim.is_released());
        assert_eq!(sim.pulses(), (Some(1500), Some(1000), Some(1948)));
        assert_eq!(sim.relays(), (false, false));

        // neutral outputs strictly before release
        let events = sim.events();
        let tail = &events[events.len() - 6..];
        assert_eq!(tail, &[
            BackendEvent::Pulse(PwmChannel::Steering, 1500),
            BackendEvent::Pulse(PwmChannel::Throttle, 1000),
            BackendEvent::Pulse(PwmChannel::Brake, 1948),
            BackendEvent::Digital(RelayChannel::Forward, false),
            BackendEvent::Digital(RelayChannel::Reverse, false),
            BackendEvent::Released,
        ]);
    }

    #[test]
    fn test_cancelled_before_start_only_neutralizes() {
        let token = ShutdownToken::new();
        token.cancel();
        let mut rx = receiver(&token, WireFormat::Raw, vec![
            raw(ActuationFrame::new(1835, 2000, 1135, GearState::Drive)),
        ]);

        rx.run(&token).unwrap();
        assert_eq!(rx.stats().frames_applied, 0);
        assert!(rx.backend().is_released());
        assert!(rx.poll_once().is_err());
    }

    #[test]
    fn test_framed_resync_after_garbage() {
        let token = ShutdownToken::new();
        let good = ActuationFrame::new(1650, 1250, 1135, GearState::Drive);
        let mut broken = WireFormat::Framed.encode(&ActuationFrame::neutral());
        broken.truncate(7);

        let mut rx = receiver(&token, WireFormat::Framed, vec![
            Some(broken),
            framed(good),
        ]);

        assert_eq!(rx.poll_once().unwrap(), good);
        assert_eq!(rx.backend().relays(), (true, false));
    }

    #[test]
    fn test_framed_timeout_is_short_read() {
        let token = ShutdownToken::new();
        let bytes = WireFormat::Framed.encode(&ActuationFrame::neutral());
        let mut rx = receiver(&token, WireFormat::Framed, vec![Some(bytes[..4].to_vec()), None, Some(bytes[4..].to_vec())]);

        assert!(matches!(rx.poll_once(), Err(LinkError::ShortRead { got: 4, expected: FRAMED_SIZE })));
        // the buffered half is completed by the next read
        assert_eq!(rx.poll_once().unwrap(), ActuationFrame::neutral());
    }

    #[test]
    fn test_framed_noise_is_malformed() {
        let token = ShutdownToken::new();
        let noise = vec![0x11u8; MAX_SCAN_BYTES + 1];
        let mut rx = receiver(&token, WireFormat::Framed, vec![Some(noise)]);

        assert!(matches!(rx.poll_once(), Err(LinkError::MalformedPacket(_))));
        assert_eq!(rx.stats().malformed, 1);
    }

    #[test]
    fn test_failsafe_after_consecutive_drops() {
        let token = ShutdownToken::new();
        let options = ReceiverOptions { format: WireFormat::Raw, failsafe_after: Some(2) };
        let port = ScriptedPort::new(&token, vec![
            raw(ActuationFrame::new(1835, 2000, 1135, GearState::Drive)),
            None,
            None,
            raw(ActuationFrame::new(1200, 1500, 1135, GearState::Reverse)),
        ]);
        let mut rx = Receiver::new(port, SimulatedBackend::new(), options).unwrap();

        rx.poll_once().unwrap();
        assert!(rx.poll_once().is_err());
        assert_eq!(rx.backend().relays(), (true, false));

        assert!(rx.poll_once().is_err());
        assert_eq!(rx.stats().failsafe_trips, 1);
        assert_eq!(rx.backend().pulses(), (Some(1500), Some(1000), Some(1948)));
        assert_eq!(rx.backend().relays(), (false, false));

        // link back: outputs follow frames again
        rx.poll_once().unwrap();
        assert_eq!(rx.backend().relays(), (false, true));
    }

    #[test]
    fn test_token_clones_share_state() {
        let token = ShutdownToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(token.is_cancelled());
    }
}
