//! The VL53L4CD flips a bit in `GPIO_TIO_HV_STATUS` when a measurement is
//! ready. Blocking waits on that bit, and on boot.

use core::time::Duration;

use i2cdev::linux::LinuxI2CError;

use crate::{i2c::Device, vl53l4cd::DeviceError, vl53l4cd::Register, DATA_POLL_INTERVAL};

pub(crate) fn has_measurement(dev: &mut Device) -> Result<bool, LinuxI2CError> {
    let ctrl = dev.read_byte(Register::GPIO_HV_MUX_CTRL)?;
    let status = dev.read_byte(Register::GPIO_TIO_HV_STATUS)?;
    Ok(status & 1 != ctrl >> 4 & 1)
}

/// Wait by polling the sensor at a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    /// Pause between checks.
    pub interval: Duration,
    /// Checks before giving up with [`DeviceError::Timeout`].
    pub attempts: u16,
}

impl Default for Poll {
    /// Every [`DATA_POLL_INTERVAL`], for about a second.
    fn default() -> Self {
        Self {
            interval: DATA_POLL_INTERVAL,
            attempts: 100,
        }
    }
}

impl Poll {
    /// Block until the sensor has a measurement.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Timeout`] if none arrives within `attempts` checks.
    pub(crate) fn wait(&self, dev: &mut Device) -> Result<(), DeviceError> {
        self.until(|| Ok(has_measurement(dev)?))
    }

    /// Block until `ready` says so.
    pub(crate) fn until<F>(&self, mut ready: F) -> Result<(), DeviceError>
    where
        F: FnMut() -> Result<bool, DeviceError>,
    {
        for _ in 0..self.attempts {
            if ready()? {
                return Ok(());
            }
            std::thread::sleep(self.interval);
        }

        Err(DeviceError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn until_gives_up_after_attempts() {
        let poll = Poll {
            interval: Duration::ZERO,
            attempts: 3,
        };
        let mut checks = 0;

        let result = poll.until(|| {
            checks += 1;
            Ok(false)
        });
        assert!(matches!(result, Err(DeviceError::Timeout)));
        assert_eq!(checks, 3);
    }

    #[test]
    fn until_stops_at_first_ready() {
        let poll = Poll {
            interval: Duration::ZERO,
            attempts: 10,
        };
        let mut checks = 0;

        poll.until(|| {
            checks += 1;
            Ok(checks == 2)
        })
        .unwrap();
        assert_eq!(checks, 2);
    }

    #[test]
    fn until_propagates_errors() {
        let poll = Poll::default();
        let result = poll.until(|| Err(DeviceError::UnexpectedModelId(0)));
        assert!(matches!(result, Err(DeviceError::UnexpectedModelId(0))));
    }
}
