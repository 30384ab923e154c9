pub mod protocol;
pub use protocol::*;

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use tracing::info;
use crate::error::LinkError;

//the actuator link misbehaves at any other rate, so this is not configurable
pub const BAUD_RATE: u32 = 115200;
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

pub const SYNC_BYTE: u8 = 0xAA;
//frame format: [SYNC][LEN][PAYLOAD...][CHECKSUM]
pub const FRAME_OVERHEAD: usize = 3;
pub const FRAMED_SIZE: usize = PACKET_SIZE + FRAME_OVERHEAD;

/// How actuation packets are laid out on the byte stream. Both ends must agree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat{
    /// Bare 8-byte packets, aligned by size only
    Raw,
    /// Sync byte, length and checksum around each packet
    #[default]
    Framed,
}

impl WireFormat{
    pub fn frame_size(&self) -> usize{
        match self{
            WireFormat::Raw => PACKET_SIZE,
            WireFormat::Framed => FRAMED_SIZE,
        }
    }

    pub fn encode(&self, frame: &ActuationFrame) -> Vec<u8>{
        let payload = frame.encode();
        match self{
            WireFormat::Raw => payload.to_vec(),
            WireFormat::Framed =>{
                let mut out = Vec::with_capacity(FRAMED_SIZE);
                out.push(SYNC_BYTE);
                out.push(PACKET_SIZE as u8);
                out.extend_from_slice(&payload);
                let checksum = calculate_checksum(&out[1..]);
                out.push(checksum);
                out
            }
        }
    }
}

impl fmt::Display for WireFormat{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result{
        match self{
            WireFormat::Raw => write!(f, "raw"),
            WireFormat::Framed => write!(f, "framed"),
        }
    }
}

impl FromStr for WireFormat{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>{
        match s{
            "raw" => Ok(WireFormat::Raw),
            "framed" => Ok(WireFormat::Framed),
            other => Err(format!("unknown wire format '{}' (expected raw or framed)", other)),
        }
    }
}

pub fn calculate_checksum(data: &[u8]) -> u8{
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Pulls framed packets out of a byte stream, resynchronizing on the sync byte
/// after garbage, lost bytes or checksum failures.
#[derive(Debug, Default)]
pub struct FrameDecoder{
    rx_buffer: Vec<u8>,
    discarded: usize,
}

impl FrameDecoder{
    pub fn new() -> Self{
        FrameDecoder{
            rx_buffer: Vec::with_capacity(4 * FRAMED_SIZE),
            discarded: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]){
        self.rx_buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet part of a complete frame
    pub fn pending(&self) -> usize{
        self.rx_buffer.len()
    }

    /// Bytes thrown away while hunting for a frame boundary
    pub fn discarded(&self) -> usize{
        self.discarded
    }

    pub fn clear(&mut self){
        self.rx_buffer.clear();
    }

    /// Next complete, checksum-valid payload, if any
    pub fn try_parse_frame(&mut self) -> Option<[u8; PACKET_SIZE]>{
        loop{
            if self.rx_buffer.len() < FRAMED_SIZE{
                //keep a partial frame only if it starts on a sync byte
                self.skip_to_sync();
                return None;
            }

            if !self.skip_to_sync(){
                return None;
            }

            if self.rx_buffer.len() < FRAMED_SIZE{
                return None;
            }

            let len = self.rx_buffer[1] as usize;
            if len != PACKET_SIZE{
                self.drop_front(1);
                continue;
            }

            let checksum = self.rx_buffer[FRAMED_SIZE - 1];
            let calculated = calculate_checksum(&self.rx_buffer[1..FRAMED_SIZE - 1]);
            if checksum != calculated{
                self.drop_front(1);
                continue;
            }

            let mut payload = [0u8; PACKET_SIZE];
            payload.copy_from_slice(&self.rx_buffer[2..2 + PACKET_SIZE]);
            self.rx_buffer.drain(0..FRAMED_SIZE);
            return Some(payload);
        }
    }

    //drop bytes up to the next sync byte; false if none is buffered
    fn skip_to_sync(&mut self) -> bool{
        match self.rx_buffer.iter().position(|&b| b == SYNC_BYTE){
            Some(pos) =>{
                self.drop_front(pos);
                true
            }
            None =>{
                let n = self.rx_buffer.len();
                self.drop_front(n);
                false
            }
        }
    }

    fn drop_front(&mut self, n: usize){
        if n > 0{
            self.rx_buffer.drain(0..n);
            self.discarded += n;
        }
    }
}

/// Open the serial device at the fixed link rate and wait for it to settle.
pub fn open_link(path: &str) -> Result<Box<dyn SerialPort>, LinkError>{
    info!(path, baud = BAUD_RATE, "opening serial link");

    let port = serialport::new(path, BAUD_RATE)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|source| LinkError::LinkUnavailable{ path: path.to_string(), source })?;

    thread::sleep(SETTLE_DELAY);
    info!(path, "serial link ready");

    Ok(port)
}

#[cfg(test)]
mod tests{
    use super::*;
    use crate::control::GearState;

    fn sample() -> ActuationFrame{
        ActuationFrame::new(1600, 1400, 1200, GearState::Drive)
    }

    #[test]
    fn test_wire_format_parse(){
        assert_eq!("raw".parse::<WireFormat>(), Ok(WireFormat::Raw));
        assert_eq!("framed".parse::<WireFormat>(), Ok(WireFormat::Framed));
        assert!("json".parse::<WireFormat>().is_err());
        assert_eq!(WireFormat::default(), WireFormat::Framed);
    }

    #[test]
    fn test_frame_size_matches_encoding(){
        for format in [WireFormat::Raw, WireFormat::Framed]{
            assert_eq!(format.encode(&sample()).len(), format.frame_size());
        }
    }

    #[test]
    fn test_open_missing_device_is_unavailable(){
        match open_link("/dev/pius-nope"){
            Err(LinkError::LinkUnavailable{ path, .. }) => assert_eq!(path, "/dev/pius-nope"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("opened a missing device"),
        }
    }

    #[test]
    fn test_raw_is_bare_packet(){
        let bytes = WireFormat::Raw.encode(&sample());
        assert_eq!(bytes, sample().encode().to_vec());
    }

    #[test]
    fn test_framed_layout(){
        let bytes = WireFormat::Framed.encode(&sample());
        assert_eq!(bytes.len(), FRAMED_SIZE);
        assert_eq!(bytes[0], SYNC_BYTE);
        assert_eq!(bytes[1], PACKET_SIZE as u8);
        assert_eq!(&bytes[2..10], &sample().encode());
        assert_eq!(bytes[10], calculate_checksum(&bytes[1..10]));
    }

    #[test]
    fn test_decoder_waits_for_complete_frame(){
        let bytes = WireFormat::Framed.encode(&sample());
        let mut decoder = FrameDecoder::new();

        decoder.push(&bytes[..6]);
        assert_eq!(decoder.try_parse_frame(), None);
        assert_eq!(decoder.pending(), 6);

        decoder.push(&bytes[6..]);
        assert_eq!(decoder.try_parse_frame(), Some(sample().encode()));
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_resyncs_after_lost_byte(){
        let mut first = WireFormat::Framed.encode(&sample());
        first.remove(4);
        let second = ActuationFrame::neutral();

        let mut decoder = FrameDecoder::new();
        decoder.push(&first);
        decoder.push(&WireFormat::Framed.encode(&second));

        assert_eq!(decoder.try_parse_frame(), Some(second.encode()));
        assert_eq!(decoder.try_parse_frame(), None);
        assert!(decoder.discarded() > 0);
    }

    #[test]
    fn test_decoder_skips_leading_garbage(){
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0x01, 0x02, 0x03]);
        assert_eq!(decoder.try_parse_frame(), None);
        assert_eq!(decoder.pending(), 0);

        decoder.push(&WireFormat::Framed.encode(&sample()));
        assert_eq!(decoder.try_parse_frame(), Some(sample().encode()));
    }

    #[test]
    fn test_decoder_rejects_bad_checksum(){
        let mut bytes = WireFormat::Framed.encode(&sample());
        bytes[10] = bytes[10].wrapping_add(1);

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        assert_eq!(decoder.try_parse_frame(), None);
    }

    #[test]
    fn test_decoder_handles_back_to_back_frames(){
        let mut decoder = FrameDecoder::new();
        let mut stream = WireFormat::Framed.encode(&sample());
        stream.extend(WireFormat::Framed.encode(&ActuationFrame::neutral()));
        decoder.push(&stream);

        assert_eq!(decoder.try_parse_frame(), Some(sample().encode()));
        assert_eq!(decoder.try_parse_frame(), Some(ActuationFrame::neutral().encode()));
        assert_eq!(decoder.try_parse_frame(), None);
    }
}
