//! Exclusive, scoped ownership of one native sensor instance.

#[cfg(feature = "tracing")]
use tracing::{debug, instrument, warn};

use core::fmt::Debug;

use crate::{session::DistanceSample, Refusal, SensorDriver, SensorError};

/// An open sensor.
///
/// The native instance is concluded exactly once: by [`Self::release`] or,
/// failing that, when the handle is dropped. `is_armed` implies `is_open`.
pub struct SensorHandle<'d, D: SensorDriver> {
    driver: &'d mut D,
    instance: Option<D::Instance>,
    armed: bool,
    address: u8,
}

impl<'d, D: SensorDriver> SensorHandle<'d, D> {
    /// Ask `driver` for an instance at the 7-bit `address`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(driver)))]
    pub fn open(driver: &'d mut D, address: u8) -> Result<Self, SensorError<D::Error>> {
        let instance = driver.instantiate(address).map_err(|cause| {
            #[cfg(feature = "tracing")]
            debug!(?cause, "no sensor instance");
            SensorError::Instantiation { address, cause }
        })?;

        #[cfg(feature = "tracing")]
        debug!("sensor instance created");

        Ok(Self {
            driver,
            instance: Some(instance),
            armed: false,
            address,
        })
    }

    /// Bus address this handle was opened at.
    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Whether the native instance is still held.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.instance.is_some()
    }

    /// Whether ranging has been started.
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Start ranging. Arming an armed handle succeeds without calling the
    /// driver again.
    ///
    /// # Errors
    ///
    /// [`SensorError::Arm`] if the driver refuses or faults, and
    /// [`SensorError::Released`] if the handle was already released.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), err))]
    pub fn arm(&mut self) -> Result<(), SensorError<D::Error>> {
        if self.armed {
            #[cfg(feature = "tracing")]
            debug!("already armed");
            return Ok(());
        }

        let Some(instance) = self.instance.as_mut() else {
            return Err(SensorError::Released);
        };
        match self.driver.start_ranging(instance) {
            Ok(true) => {
                self.armed = true;
                Ok(())
            }
            Ok(false) => Err(SensorError::Arm(Refusal::Refused)),
            Err(e) => Err(SensorError::Arm(Refusal::Bus(e))),
        }
    }

    /// Whether the driver has a fresh sample waiting.
    pub fn is_data_ready(&mut self) -> Result<bool, SensorError<D::Error>> {
        let instance = armed::<_, D::Error>(&mut self.instance, self.armed)?;
        self.driver.is_data_ready(instance).map_err(SensorError::Read)
    }

    /// Read the next distance. The sample carries `ordinal` unchanged.
    ///
    /// # Errors
    ///
    /// [`SensorError::NotArmed`] unless [`Self::arm`] succeeded first,
    /// [`SensorError::Released`] after [`Self::release`], and
    /// [`SensorError::Read`] if the driver faults.
    pub fn read_sample(&mut self, ordinal: u32) -> Result<DistanceSample, SensorError<D::Error>> {
        let instance = armed::<_, D::Error>(&mut self.instance, self.armed)?;
        let distance_mm = self.driver.get_range(instance).map_err(SensorError::Read)?;

        Ok(DistanceSample {
            distance_mm,
            ordinal,
        })
    }

    /// Stop ranging if armed and conclude the native instance. Releasing a
    /// closed handle does nothing.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn release(&mut self) {
        let Some(mut instance) = self.instance.take() else {
            return;
        };

        if core::mem::take(&mut self.armed) {
            match self.driver.stop_ranging(&mut instance) {
                Ok(true) => {}
                #[allow(unused_variables)]
                other => {
                    #[cfg(feature = "tracing")]
                    warn!(result = ?other, "ranging did not stop cleanly");
                }
            }
        }

        self.driver.conclude(instance);

        #[cfg(feature = "tracing")]
        debug!("sensor instance released");
    }
}

fn armed<I, E: Debug>(instance: &mut Option<I>, armed: bool) -> Result<&mut I, SensorError<E>> {
    match instance.as_mut() {
        None => Err(SensorError::Released),
        Some(_) if !armed => Err(SensorError::NotArmed),
        Some(instance) => Ok(instance),
    }
}

impl<D: SensorDriver> Drop for SensorHandle<'_, D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Call, Fault, FakeDriver};

    #[test]
    fn open_failure_is_instantiation_error() {
        let mut driver = FakeDriver::default();
        driver.fail_instantiate = true;

        let err = SensorHandle::open(&mut driver, 0x29).err().unwrap();
        assert!(matches!(
            err,
            SensorError::Instantiation { address: 0x29, .. }
        ));
        assert_eq!(driver.concludes(), 0);
    }

    #[test]
    fn read_before_arm_is_rejected() {
        let mut driver = FakeDriver::with_ranges([4.0]);
        let mut handle = SensorHandle::open(&mut driver, 0x29).unwrap();

        assert!(matches!(handle.read_sample(0), Err(SensorError::NotArmed)));
        assert!(matches!(handle.is_data_ready(), Err(SensorError::NotArmed)));
        drop(handle);
        assert_eq!(driver.reads(), 0);
    }

    #[test]
    fn arm_twice_calls_driver_once() {
        let mut driver = FakeDriver::default();
        let mut handle = SensorHandle::open(&mut driver, 0x29).unwrap();

        handle.arm().unwrap();
        handle.arm().unwrap();
        assert!(handle.is_armed());
        drop(handle);
        assert_eq!(driver.count(|c| matches!(c, Call::StartRanging(_))), 1);
    }

    #[test]
    fn refused_and_faulted_arm() {
        let mut driver = FakeDriver::default();
        driver.start = Some(Ok(false));
        let mut handle = SensorHandle::open(&mut driver, 0x29).unwrap();
        assert!(matches!(handle.arm(), Err(SensorError::Arm(Refusal::Refused))));
        assert!(!handle.is_armed());
        drop(handle);

        driver.start = Some(Err(Fault("nack")));
        let mut handle = SensorHandle::open(&mut driver, 0x29).unwrap();
        assert!(matches!(
            handle.arm(),
            Err(SensorError::Arm(Refusal::Bus(Fault("nack"))))
        ));
    }

    #[test]
    fn zero_distance_is_a_sample() {
        let mut driver = FakeDriver::with_ranges([0.0]);
        let mut handle = SensorHandle::open(&mut driver, 0x29).unwrap();
        handle.arm().unwrap();

        assert!(handle.is_data_ready().unwrap());
        let sample = handle.read_sample(3).unwrap();
        assert_eq!(sample.ordinal, 3);
        assert!(sample.is_no_target());
    }

    #[test]
    fn release_is_idempotent() {
        let mut driver = FakeDriver::default();
        let mut handle = SensorHandle::open(&mut driver, 0x29).unwrap();
        handle.arm().unwrap();

        handle.release();
        assert!(!handle.is_open());
        assert!(!handle.is_armed());
        handle.release();
        drop(handle);

        assert_eq!(driver.concludes(), 1);
        assert_eq!(
            driver.calls,
            [
                Call::Instantiate(0x29),
                Call::StartRanging(1),
                Call::StopRanging(1),
                Call::Conclude(1),
            ]
        );
    }

    #[test]
    fn drop_releases_unarmed_handle_without_stopping() {
        let mut driver = FakeDriver::default();
        drop(SensorHandle::open(&mut driver, 0x29).unwrap());

        assert_eq!(driver.calls, [Call::Instantiate(0x29), Call::Conclude(1)]);
    }

    #[test]
    fn release_concludes_even_if_stop_fails() {
        let mut driver = FakeDriver::default();
        driver.stop = Some(Err(Fault("bus lost")));
        let mut handle = SensorHandle::open(&mut driver, 0x29).unwrap();
        handle.arm().unwrap();
        handle.release();
        drop(handle);

        assert_eq!(driver.concludes(), 1);
    }

    #[test]
    fn arm_after_release_fails() {
        let mut driver = FakeDriver::default();
        let mut handle = SensorHandle::open(&mut driver, 0x29).unwrap();
        handle.release();
        assert!(matches!(handle.arm(), Err(SensorError::Released)));
    }

    #[test]
    fn reads_after_release_report_released() {
        let mut driver = FakeDriver::with_ranges([4.0]);
        let mut handle = SensorHandle::open(&mut driver, 0x29).unwrap();
        handle.arm().unwrap();
        handle.release();

        let err = handle.read_sample(0).unwrap_err();
        assert_eq!(err.kind(), "ReleasedError");
        assert!(matches!(handle.is_data_ready(), Err(SensorError::Released)));
        drop(handle);
        assert_eq!(driver.reads(), 0);
    }
}
