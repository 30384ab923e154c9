use pyo3::prelude::*;
use pyo3::exceptions::{PyIOError, PyValueError};
use crate::control::{ControlMode, DriveMode, NormalizedControl, PilotControl};
use crate::transmitter::Transmitter;
use crate::uart::{ActuationFrame, WireFormat};

type FrameTuple = (i16, i16, i16, i16);

fn frame_tuple(f: &ActuationFrame) -> FrameTuple{
    (f.steering_pulse, f.throttle_pulse, f.brake_pulse, f.gear_state)
}

fn parse_format(wire_format: &str) -> PyResult<WireFormat>{
    wire_format.parse().map_err(PyValueError::new_err)
}

/// Vehicle-loop part: `run(angle, throttle, brake)` once per tick,
/// `shutdown()` on exit.
#[pyclass(name = "Transmitter", unsendable)]
pub struct PyTransmitter{
    inner: Transmitter,
}

#[pymethods]
impl PyTransmitter{
    #[new]
    #[pyo3(signature = (port="/dev/ttyTHS1", wire_format="framed"))]
    fn new(port: &str, wire_format: &str) -> PyResult<Self>{
        crate::logging::init(crate::logging::DEFAULT_FILTER);
        let format = parse_format(wire_format)?;
        let inner = Transmitter::open(port, format)
            .map_err(|e| PyIOError::new_err(e.to_string()))?;
        Ok(PyTransmitter{ inner })
    }

    /// Returns the (steering, throttle, brake, gear) pulses that were sent
    fn run(&mut self, angle: f64, throttle: f64, brake: f64) -> PyResult<FrameTuple>{
        self.inner
            .send(angle, throttle, brake)
            .map(|f| frame_tuple(&f))
            .map_err(|e| PyIOError::new_err(e.to_string()))
    }

    fn run_threaded(&mut self, angle: f64, throttle: f64, brake: f64) -> PyResult<FrameTuple>{
        self.run(angle, throttle, brake)
    }

    fn shutdown(&mut self) -> PyResult<()>{
        self.inner.shutdown().map_err(|e| PyIOError::new_err(e.to_string()))
    }

    fn frames_sent(&self) -> u64{
        self.inner.frames_sent()
    }
}

/// Vehicle-loop part picking user or pilot controls. `None` pilot values
/// count as absent.
#[pyclass(name = "DriveMode")]
pub struct PyDriveMode{
    inner: DriveMode,
}

#[pymethods]
impl PyDriveMode{
    #[new]
    #[pyo3(signature = (ai_throttle_mult=1.0))]
    fn new(ai_throttle_mult: f64) -> Self{
        PyDriveMode{ inner: DriveMode::new(ai_throttle_mult) }
    }

    #[allow(clippy::too_many_arguments)]
    #[pyo3(signature = (mode, user_angle, user_throttle, user_brake, pilot_angle=None, pilot_throttle=None, pilot_brake=None))]
    fn run(
        &self,
        mode: &str,
        user_angle: f64,
        user_throttle: f64,
        user_brake: f64,
        pilot_angle: Option<f64>,
        pilot_throttle: Option<f64>,
        pilot_brake: Option<f64>,
    ) -> (f64, f64, f64){
        let user = NormalizedControl::new(user_angle, user_throttle, user_brake);
        let pilot = PilotControl{ angle: pilot_angle, throttle: pilot_throttle, brake: pilot_brake };
        let out = self.inner.arbitrate(ControlMode::from_label(mode), &user, &pilot);
        (out.angle, out.throttle, out.brake)
    }

    #[getter]
    fn ai_throttle_mult(&self) -> f64{
        self.inner.ai_throttle_mult
    }
}

/// Pulses a control triple would be sent as, without touching the link
#[pyfunction]
fn map_control(angle: f64, throttle: f64, brake: f64) -> FrameTuple{
    frame_tuple(&ActuationFrame::from_control(&NormalizedControl::new(angle, throttle, brake)))
}

#[pymodule]
fn pius_link(_py: Python, m: &PyModule) -> PyResult<()>{
    m.add_class::<PyTransmitter>()?;
    m.add_class::<PyDriveMode>()?;
    m.add_function(wrap_pyfunction!(map_control, m)?)?;
    Ok(())
}
