//! [`SensorDriver`] for the [VL53L4CD](https://www.st.com/en/imaging-and-photonics-solutions/vl53l4cd.html)
//! on a Linux I<sup>2</sup>C bus.
//!
//! ```no_run
//! use tof_ranging::{vl53l4cd::Vl53l4cd, PollLoop};
//!
//! let mut poll = PollLoop::new(Vl53l4cd::new("/dev/i2c-1").with_range_timing(200, 0));
//! poll.run(|report| println!("{report}"))?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::path::PathBuf;

use i2cdev::linux::LinuxI2CError;

#[cfg(feature = "tracing")]
use tracing::{debug, instrument, trace};

pub use crate::wait::Poll;
use crate::{i2c::Device, SensorDriver};

/// Model id reported by every VL53L4CD.
pub const MODEL_ID: u16 = 0xebaa;

/// Default I<sup>2</sup>C bus device.
pub const DEFAULT_BUS: &str = "/dev/i2c-1";

// register 0x002d onwards, written in one transfer after boot
const DEFAULT_CONFIG_MSG: &[u8] = &[
    0x00, 0x2d, // first register
    0x12, 0x00, 0x00, 0x11, 0x02, 0x00, 0x02, 0x08, // 0x2d
    0x00, 0x08, 0x10, 0x01, 0x01, 0x00, 0x00, 0x00, // 0x35
    0x00, 0xff, 0x00, 0x0f, 0x00, 0x00, 0x00, 0x00, // 0x3d
    0x00, 0x20, 0x0b, 0x00, 0x00, 0x02, 0x14, 0x21, // 0x45
    0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0xc8, // 0x4d
    0x00, 0x00, 0x38, 0xff, 0x01, 0x00, 0x08, 0x00, // 0x55
    0x00, 0x01, 0xcc, 0x07, 0x01, 0xf1, 0x05, 0x00, // 0x5d
    0xa0, 0x00, 0x80, 0x08, 0x38, 0x00, 0x00, 0x00, // 0x65
    0x00, 0x0f, 0x89, 0x00, 0x00, 0x00, 0x00, 0x00, // 0x6d
    0x00, 0x00, 0x01, 0x07, 0x05, 0x06, 0x06, 0x00, // 0x75
    0x00, 0x02, 0xc7, 0xff, 0x9b, 0x00, 0x00, 0x00, // 0x7d
    0x01, 0x00, 0x00, // 0x85
];

#[derive(Debug, Clone, Copy)]
#[allow(non_camel_case_types)]
pub(crate) enum Register {
    OSC_FREQ = 0x0006,
    VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND = 0x0008,
    MYSTERY_1 = 0x000b,
    MYSTERY_2 = 0x0024,
    SYSTEM_START = 0x0087,
    GPIO_HV_MUX_CTRL = 0x0030,
    GPIO_TIO_HV_STATUS = 0x0031,
    RANGE_CONFIG_A = 0x005e,
    RANGE_CONFIG_B = 0x0061,
    INTERMEASUREMENT_MS = 0x006c,
    SYSTEM_INTERRUPT_CLEAR = 0x0086,
    RESULT_RANGE_STATUS = 0x0089,
    RESULT_DISTANCE = 0x0096,
    SYSTEM_STATUS = 0x00e5,
    IDENTIFICATION_MODEL_ID = 0x010f,
}

impl Register {
    const fn addr(&self) -> u16 {
        *self as u16
    }

    pub(crate) const fn as_bytes(&self) -> [u8; 2] {
        self.addr().to_be_bytes()
    }
}

/// Errors from the VL53L4CD backend.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The bus transfer failed.
    #[error("i2c: {0}")]
    I2c(#[from] LinuxI2CError),
    /// Something answered at the address, but not a VL53L4CD.
    #[error("unexpected model id {0:#06x}")]
    UnexpectedModelId(u16),
    /// The sensor did not boot or produce a measurement in time.
    #[error("timed out waiting for the sensor")]
    Timeout,
    /// The requested range timing cannot be programmed.
    #[error("invalid range timing: {0}")]
    InvalidTiming(&'static str),
}

/// A measurement status, as decoded from the range status register.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    /// Returned distance is valid.
    Valid,
    /// Sigma is above the defined threshold.
    SigmaAboveThreshold,
    /// Signal is below the defined threshold.
    SignalBelowThreshold,
    /// Measured distance is below detection threshold.
    DistanceBelowDetectionThreshold,
    /// Hardware failure.
    HardwareFail,
    /// Phase valid but no wrap around check performed.
    NoWrapAroundCheck,
    /// Wrapped target, phase does not match.
    WrappedTargetPhaseMismatch,
    /// Crosstalk signal fail.
    XTalkFail,
    /// Interrupt error.
    InterruptError,
    /// Merged target.
    MergedTarget,
    /// Too low signal.
    SignalTooWeak,
    /// Anything else (e.g. boot error).
    Other,
}

impl Status {
    const fn from_rtn(rtn: u8) -> Self {
        match rtn {
            3 => Self::HardwareFail,
            4 | 5 => Self::SignalBelowThreshold,
            6 => Self::SigmaAboveThreshold,
            7 => Self::WrappedTargetPhaseMismatch,
            8 => Self::DistanceBelowDetectionThreshold,
            9 => Self::Valid,
            12 => Self::XTalkFail,
            13 | 18 => Self::InterruptError,
            19 => Self::NoWrapAroundCheck,
            22 => Self::MergedTarget,
            23 => Self::SignalTooWeak,
            _ => Self::Other,
        }
    }
}

/// One raw VL53L4CD measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Validity of the measurement.
    pub status: Status,
    /// Measured distance to the target (millimeters).
    pub distance: u16,
}

/// Distances the backend trusts. Anything outside, or with a non-valid
/// status, is reported as "no target" (`0.0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidWindow {
    /// Exclusive lower bound (millimeters).
    pub min_mm: u16,
    /// Exclusive upper bound (millimeters).
    pub max_mm: u16,
}

impl Default for ValidWindow {
    fn default() -> Self {
        Self {
            min_mm: 10,
            max_mm: 1200,
        }
    }
}

impl ValidWindow {
    /// The distance to report for `m`.
    pub fn distance(&self, m: &Measurement) -> f64 {
        if m.status == Status::Valid && m.distance > self.min_mm && m.distance < self.max_mm {
            f64::from(m.distance)
        } else {
            0.0
        }
    }
}

/// Macro period in microseconds for an oscillator reading, `None` if the
/// reading is zero.
fn macro_period_us(osc_freq: u16) -> Option<u64> {
    let ticks = 0x4000_0000u64.checked_div(u64::from(osc_freq))?;
    Some((2304 * ticks) >> 6)
}

/// Register values for `RANGE_CONFIG_A` (`vcsel_factor = 16`) and
/// `RANGE_CONFIG_B` (`vcsel_factor = 12`). `None` if the period is too short
/// to encode.
fn range_config(timing_budget_us: u32, macro_period_us: u64, vcsel_factor: u64) -> Option<u16> {
    let budget = u64::from(timing_budget_us) << 12;
    let period = (macro_period_us * vcsel_factor) >> 6;

    let mut ls_byte = (budget + (period >> 1)).checked_div(period)?.checked_sub(1)?;
    let mut ms_byte = 0u16;
    while ls_byte > 0xff {
        ls_byte >>= 1;
        ms_byte += 1;
    }

    Some((ms_byte << 8) | ls_byte as u16)
}

/// An initialized VL53L4CD, the per-sensor instance of [`Vl53l4cd`].
pub struct Sensor {
    dev: Device,
}

impl Sensor {
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, boot), err))]
    fn init(&mut self, timing_budget_ms: u32, inter_measurement_ms: u32, boot: &Poll) -> Result<(), DeviceError> {
        let id = self.dev.read_word(Register::IDENTIFICATION_MODEL_ID)?;
        if id != MODEL_ID {
            return Err(DeviceError::UnexpectedModelId(id));
        }

        #[cfg(feature = "tracing")]
        debug!("waiting for boot");

        boot.until(|| Ok(self.dev.read_byte(Register::SYSTEM_STATUS)? == 0x3))?;

        #[cfg(feature = "tracing")]
        debug!("booted");

        self.dev.write(DEFAULT_CONFIG_MSG)?;

        // one throwaway measurement calibrates VHV
        self.start_ranging()?;
        boot.wait(&mut self.dev)?;
        self.clear_interrupt()?;
        self.stop_ranging()?;
        self.dev.write_byte(Register::VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND, 0x09)?;
        self.dev.write_byte(Register::MYSTERY_1, 0)?;
        self.dev.write_word(Register::MYSTERY_2, 0x500)?;

        self.set_range_timing(timing_budget_ms, inter_measurement_ms)
    }

    /// Set the range timing. The timing budget must be within 10..=200 ms,
    /// and an inter-measurement period, unless zero (continuous mode), must
    /// exceed it.
    pub fn set_range_timing(&mut self, timing_budget_ms: u32, inter_measurement_ms: u32) -> Result<(), DeviceError> {
        if !(10..=200).contains(&timing_budget_ms) {
            return Err(DeviceError::InvalidTiming("timing budget must be in range [10, 200]"));
        }

        let osc_freq = self.dev.read_word(Register::OSC_FREQ)?;
        let macro_period_us =
            macro_period_us(osc_freq).ok_or(DeviceError::InvalidTiming("oscillation frequency is zero"))?;

        let mut timing_budget_us = timing_budget_ms * 1000;

        if inter_measurement_ms == 0 {
            // continuous
            self.dev.write_dword(Register::INTERMEASUREMENT_MS, 0)?;
            timing_budget_us -= 2500;
        } else if inter_measurement_ms > timing_budget_ms {
            // autonomous low power
            let clock_pll = osc_freq & 0x3ff;
            let period = (f64::from(clock_pll) * f64::from(inter_measurement_ms) * 1.055) as u32;
            self.dev.write_dword(Register::INTERMEASUREMENT_MS, period)?;
            timing_budget_us -= 4300;
            timing_budget_us /= 2;
        } else {
            return Err(DeviceError::InvalidTiming(
                "timing budget must not be less than inter-measurement",
            ));
        }

        let (Some(a), Some(b)) = (
            range_config(timing_budget_us, macro_period_us, 16),
            range_config(timing_budget_us, macro_period_us, 12),
        ) else {
            return Err(DeviceError::InvalidTiming("macro period out of range"));
        };
        self.dev.write_word(Register::RANGE_CONFIG_A, a)?;
        self.dev.write_word(Register::RANGE_CONFIG_B, b)?;

        Ok(())
    }

    /// Read the current measurement. Wait for one to be ready first, or
    /// it may be overwritten halfway through reading it.
    pub fn read_measurement(&mut self) -> Result<Measurement, DeviceError> {
        let status = self.dev.read_byte(Register::RESULT_RANGE_STATUS)? & 0x1f;

        Ok(Measurement {
            status: Status::from_rtn(status),
            distance: self.dev.read_word(Register::RESULT_DISTANCE)?,
        })
    }

    /// Clear the interrupt, which lets the sensor produce the next
    /// measurement.
    #[inline]
    pub fn clear_interrupt(&mut self) -> Result<(), DeviceError> {
        Ok(self.dev.write_byte(Register::SYSTEM_INTERRUPT_CLEAR, 0x01)?)
    }

    /// Begin ranging.
    pub fn start_ranging(&mut self) -> Result<(), DeviceError> {
        let start = if self.dev.read_dword(Register::INTERMEASUREMENT_MS)? == 0 {
            0x21 // continuous
        } else {
            0x40 // autonomous
        };
        Ok(self.dev.write_byte(Register::SYSTEM_START, start)?)
    }

    /// Stop ranging.
    #[inline]
    pub fn stop_ranging(&mut self) -> Result<(), DeviceError> {
        Ok(self.dev.write_byte(Register::SYSTEM_START, 0x00)?)
    }
}

/// Factory for [`Sensor`]s on one bus.
#[derive(Debug, Clone)]
pub struct Vl53l4cd {
    bus: PathBuf,
    timing_budget_ms: u32,
    inter_measurement_ms: u32,
    window: ValidWindow,
    poll: Poll,
}

impl Vl53l4cd {
    /// A driver for sensors on the bus device at `bus`, e.g. `/dev/i2c-1`.
    /// Nothing is opened until [`SensorDriver::instantiate`].
    pub fn new(bus: impl Into<PathBuf>) -> Self {
        Self {
            bus: bus.into(),
            timing_budget_ms: 50,
            inter_measurement_ms: 0,
            window: ValidWindow::default(),
            poll: Poll::default(),
        }
    }

    /// Range timing applied at instantiation; see [`Sensor::set_range_timing`].
    pub fn with_range_timing(mut self, timing_budget_ms: u32, inter_measurement_ms: u32) -> Self {
        self.timing_budget_ms = timing_budget_ms;
        self.inter_measurement_ms = inter_measurement_ms;
        self
    }

    /// Distances outside `window` are reported as no target.
    pub fn with_window(mut self, window: ValidWindow) -> Self {
        self.window = window;
        self
    }

    /// How readiness is polled, both at boot and per sample.
    pub fn with_poll(mut self, poll: Poll) -> Self {
        self.poll = poll;
        self
    }
}

impl Default for Vl53l4cd {
    fn default() -> Self {
        Self::new(DEFAULT_BUS)
    }
}

impl SensorDriver for Vl53l4cd {
    type Instance = Sensor;
    type Error = DeviceError;

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(bus = %self.bus.display()), err))]
    fn instantiate(&mut self, address: u8) -> Result<Sensor, DeviceError> {
        let mut sensor = Sensor {
            dev: Device::open(&self.bus, address)?,
        };
        sensor.init(self.timing_budget_ms, self.inter_measurement_ms, &self.poll)?;
        Ok(sensor)
    }

    fn conclude(&mut self, instance: Sensor) {
        drop(instance);
    }

    fn start_ranging(&mut self, instance: &mut Sensor) -> Result<bool, DeviceError> {
        instance.start_ranging()?;
        Ok(true)
    }

    fn stop_ranging(&mut self, instance: &mut Sensor) -> Result<bool, DeviceError> {
        instance.stop_ranging()?;
        Ok(true)
    }

    fn is_data_ready(&mut self, instance: &mut Sensor) -> Result<bool, DeviceError> {
        Ok(crate::wait::has_measurement(&mut instance.dev)?)
    }

    fn get_range(&mut self, instance: &mut Sensor) -> Result<f64, DeviceError> {
        self.poll.wait(&mut instance.dev)?;
        let measurement = instance.read_measurement()?;
        instance.clear_interrupt()?;

        #[cfg(feature = "tracing")]
        trace!(?measurement);

        Ok(self.window.distance(&measurement))
    }
}
