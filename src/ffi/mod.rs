//C ABI for hosts that drive the transmitter directly (header: include/pius_link.h)
//pilot values use NaN for "no value"

use std::ffi::{c_char, CStr};
use std::ptr;
use tracing::error;
use crate::control::{ControlMode, DriveMode, NormalizedControl, PilotControl};
use crate::transmitter::Transmitter;
use crate::uart::{ActuationFrame, WireFormat};

pub struct PiusTransmitter{
    inner: Transmitter,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PiusControl{
    pub angle: f64,
    pub throttle: f64,
    pub brake: f64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PiusFrame{
    pub steering_pulse: i16,
    pub throttle_pulse: i16,
    pub brake_pulse: i16,
    pub gear_state: i16,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PiusMode{
    User = 0,
    LocalAngle = 1,
    LocalPilot = 2,
}

impl From<PiusMode> for ControlMode{
    fn from(mode: PiusMode) -> Self{
        match mode{
            PiusMode::User => ControlMode::User,
            PiusMode::LocalAngle => ControlMode::LocalAngle,
            PiusMode::LocalPilot => ControlMode::LocalPilot,
        }
    }
}

impl From<ActuationFrame> for PiusFrame{
    fn from(f: ActuationFrame) -> Self{
        PiusFrame{
            steering_pulse: f.steering_pulse,
            throttle_pulse: f.throttle_pulse,
            brake_pulse: f.brake_pulse,
            gear_state: f.gear_state,
        }
    }
}

fn present(val: f64) -> Option<f64>{
    if val.is_nan(){ None } else { Some(val) }
}

/// Opens the device at the fixed link rate. Blocks for the settle delay.
/// Returns null if the device cannot be opened.
#[no_mangle]
pub unsafe extern "C" fn pius_transmitter_open(path: *const c_char, framed: bool) -> *mut PiusTransmitter{
    if path.is_null(){
        return ptr::null_mut();
    }

    let path_str = match unsafe{ CStr::from_ptr(path) }.to_str(){
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };
    let format = if framed{ WireFormat::Framed } else { WireFormat::Raw };

    match Transmitter::open(path_str, format){
        Ok(inner) => Box::into_raw(Box::new(PiusTransmitter{ inner })),
        Err(e) =>{
            error!("{}", e);
            ptr::null_mut()
        }
    }
}

/// Returns 0 on success, -1 on bad arguments, -2 on write failure.
/// `out_frame` may be null.
#[no_mangle]
pub unsafe extern "C" fn pius_transmitter_send(
    tx: *mut PiusTransmitter,
    steering: f64,
    throttle: f64,
    brake: f64,
    out_frame: *mut PiusFrame,
) -> i32{
    if tx.is_null(){
        return -1;
    }

    unsafe{
        let t = &mut *tx;
        match t.inner.send(steering, throttle, brake){
            Ok(frame) =>{
                if !out_frame.is_null(){
                    *out_frame = frame.into();
                }
                0
            }
            Err(e) =>{
                error!("{}", e);
                -2
            }
        }
    }
}

/// Sends the neutral frame, closes the port and frees the handle.
/// Returns 0 on success, -1 on null, -2 if the final write failed.
#[no_mangle]
pub unsafe extern "C" fn pius_transmitter_shutdown(tx: *mut PiusTransmitter) -> i32{
    if tx.is_null(){
        return -1;
    }

    let mut handle = unsafe{ Box::from_raw(tx) };
    match handle.inner.shutdown(){
        Ok(()) => 0,
        Err(e) =>{
            error!("{}", e);
            -2
        }
    }
}

/// Pure mapping of a control triple to the frame that would be sent
#[no_mangle]
pub extern "C" fn pius_map_control(control: PiusControl) -> PiusFrame{
    let control = NormalizedControl::new(control.angle, control.throttle, control.brake);
    ActuationFrame::from_control(&control).into()
}

/// Arbitrate between user and pilot. NaN pilot fields count as absent.
#[no_mangle]
pub extern "C" fn pius_arbitrate(
    mode: PiusMode,
    user: PiusControl,
    pilot: PiusControl,
    ai_throttle_mult: f64,
) -> PiusControl{
    let user = NormalizedControl::new(user.angle, user.throttle, user.brake);
    let pilot = PilotControl{
        angle: present(pilot.angle),
        throttle: present(pilot.throttle),
        brake: present(pilot.brake),
    };

    let out = DriveMode::new(ai_throttle_mult).arbitrate(mode.into(), &user, &pilot);
    PiusControl{ angle: out.angle, throttle: out.throttle, brake: out.brake }
}

#[cfg(test)]
mod tests{
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_ffi_null_handles(){
        unsafe{
            assert!(pius_transmitter_open(ptr::null(), true).is_null());
            assert_eq!(pius_transmitter_send(ptr::null_mut(), 0.0, 0.0, 0.0, ptr::null_mut()), -1);
            assert_eq!(pius_transmitter_shutdown(ptr::null_mut()), -1);
        }
    }

    #[test]
    fn test_ffi_open_missing_device(){
        let path = CString::new("/dev/pius-does-not-exist").unwrap();
        unsafe{
            assert!(pius_transmitter_open(path.as_ptr(), false).is_null());
        }
    }

    #[test]
    fn test_ffi_map_control(){
        let frame = pius_map_control(PiusControl{ angle: 1.0, throttle: 1.0, brake: 0.0 });
        assert_eq!(frame, PiusFrame{ steering_pulse: 1835, throttle_pulse: 2000, brake_pulse: 1135, gear_state: 0 });
    }

    #[test]
    fn test_ffi_arbitrate_missing_pilot(){
        let user = PiusControl{ angle: 0.2, throttle: 0.4, brake: 0.0 };
        let pilot = PiusControl{ angle: f64::NAN, throttle: 0.5, brake: f64::NAN };

        let out = pius_arbitrate(PiusMode::LocalPilot, user, pilot, 0.5);
        assert_eq!(out, PiusControl{ angle: 0.0, throttle: 0.25, brake: 0.0 });

        let out = pius_arbitrate(PiusMode::User, user, pilot, 0.5);
        assert_eq!(out, user);
    }
}
