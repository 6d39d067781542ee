//! Ranging sessions for time-of-flight distance sensors.
//!
//! A [`PollLoop`] runs [`RangingSession`]s against a [`SensorDriver`]. Each
//! session opens a [`SensorHandle`], starts ranging, throws away the first
//! (unreliable) sample, reports a fixed number of classified samples and
//! releases the handle, on the fault paths too.
//!
//! ```no_run
//! # #[cfg(feature = "i2cdev")]
//! # {
//! use tof_ranging::{vl53l4cd::Vl53l4cd, PollLoop};
//!
//! let mut poll = PollLoop::new(Vl53l4cd::new("/dev/i2c-1"));
//!
//! match poll.run(|report| println!("{report}")) {
//!     Ok(summary) => println!("{} samples", summary.samples),
//!     Err(e) => eprintln!("{e}"),
//! }
//! # }
//! ```
//!
//! A reading of exactly `0` is the driver's way of saying nothing is in range;
//! it is reported as [`Reading::NoTargetPresent`], never as a fault.

#![warn(missing_docs)]

#[cfg(feature = "i2cdev")]
pub use i2cdev;

use core::time::Duration;

mod driver;
mod error;
mod handle;
mod poll;
mod session;

#[cfg(feature = "i2cdev")]
mod i2c;
#[cfg(feature = "i2cdev")]
pub mod vl53l4cd;
#[cfg(feature = "i2cdev")]
mod wait;

#[cfg(test)]
mod fake;

pub use driver::SensorDriver;
pub use error::{Refusal, SensorError};
pub use handle::SensorHandle;
pub use poll::{Policy, PollLoop, Summary};
pub use session::{DistanceSample, RangingSession, Reading, Report, SessionConfig, SessionOutcome, SessionState};

/// Default 8-bit I<sup>2</sup>C address of the sensor, as printed in the
/// datasheet (write address).
pub const DEFAULT_I2C_ADDR: u8 = 0x52;

/// 7-bit bus address derived from [`DEFAULT_I2C_ADDR`].
pub const PERIPHERAL_ADDR: u8 = DEFAULT_I2C_ADDR >> 1;

/// Samples reported per session, not counting the warm-up sample.
pub const DEFAULT_SAMPLE_COUNT: u32 = 10;

/// How often a driver checks whether a sample is ready.
pub const DATA_POLL_INTERVAL: Duration = Duration::from_millis(10);
