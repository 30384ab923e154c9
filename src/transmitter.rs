/**
 * Serial Transmitter
 *
 * Brain-side end of the link:
 * 1. Maps a normalized control triple to pulse widths and a gear state
 * 2. Packs them into an actuation frame
 * 3. Writes the frame to the serial port
 *
 * Whatever way the owner goes away, a safe-neutral frame is the last thing
 * written before the port is closed.
 */

use std::io::Write;
use serialport::SerialPort;
use tracing::{debug, info, warn};

use crate::control::NormalizedControl;
use crate::error::LinkError;
use crate::logging::WIRE_TARGET;
use crate::uart::{open_link, ActuationFrame, WireFormat};

pub struct Transmitter<P: Write = Box<dyn SerialPort>> {
    port: Option<P>,
    format: WireFormat,
    frames_sent: u64,
}

impl Transmitter<Box<dyn SerialPort>> {
    /// Open the serial device (fixed baud, settle delay included)
    pub fn open(path: &str, format: WireFormat) -> Result<Self, LinkError> {
        let port = open_link(path)?;
        Ok(Self::new(port, format))
    }
}

impl<P: Write> Transmitter<P> {
    /// Wrap an already opened, settled stream
    pub fn new(port: P, format: WireFormat) -> Self {
        Self {
            port: Some(port),
            format,
            frames_sent: 0,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Map, encode and write one control cycle. Returns the frame that went out.
    pub fn send(&mut self, steering: f64, throttle: f64, brake: f64) -> Result<ActuationFrame, LinkError> {
        self.send_control(&NormalizedControl::new(steering, throttle, brake))
    }

    pub fn send_control(&mut self, control: &NormalizedControl) -> Result<ActuationFrame, LinkError> {
        let frame = ActuationFrame::from_control(control);
        self.send_frame(&frame)?;
        Ok(frame)
    }

    /// Write a prepared frame as is
    pub fn send_frame(&mut self, frame: &ActuationFrame) -> Result<(), LinkError> {
        let bytes = self.format.encode(frame);
        let port = self.port.as_mut().ok_or_else(|| {
            LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transmitter already shut down",
            ))
        })?;

        debug!(
            target: WIRE_TARGET,
            steering = frame.steering_pulse,
            throttle = frame.throttle_pulse,
            brake = frame.brake_pulse,
            gear = frame.gear_state,
            "tx"
        );

        port.write_all(&bytes)?;
        port.flush()?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Send the safe-neutral frame and close the port.
    ///
    /// The port is released even if the final write fails; the write error is
    /// still returned. Calling this twice is a no-op.
    pub fn shutdown(&mut self) -> Result<(), LinkError> {
        if self.port.is_none() {
            return Ok(());
        }

        info!("sending neutral frame before closing link");
        let result = self.send_frame(&ActuationFrame::neutral());
        self.port = None;
        info!(frames = self.frames_sent, "transmitter closed");
        result
    }
}

impl<P: Write> Drop for Transmitter<P> {
    fn drop(&mut self) {
        if self.port.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("neutral frame on drop failed: {}", e);
            }
        }
    }
}
