//! The low-level capability a ranging session is built on.

use core::fmt::Debug;

/// A native ToF sensor driver.
///
/// Every call blocks until the driver answers. An instance is never shared:
/// the [`crate::SensorHandle`] that created it is the only one that passes it
/// back into the driver, and [`SensorDriver::conclude`] consumes it.
pub trait SensorDriver {
    /// Opaque per-sensor state.
    type Instance;
    /// Driver fault.
    type Error: Debug;

    /// Create an instance for the sensor at the 7-bit `address`.
    fn instantiate(&mut self, address: u8) -> Result<Self::Instance, Self::Error>;

    /// Release an instance. Fire-and-forget.
    fn conclude(&mut self, instance: Self::Instance);

    /// Begin ranging. `Ok(false)` means the sensor refused.
    fn start_ranging(&mut self, instance: &mut Self::Instance) -> Result<bool, Self::Error>;

    /// Stop ranging. `Ok(false)` means the sensor refused.
    fn stop_ranging(&mut self, instance: &mut Self::Instance) -> Result<bool, Self::Error>;

    /// Whether a new sample is waiting to be read.
    fn is_data_ready(&mut self, instance: &mut Self::Instance) -> Result<bool, Self::Error>;

    /// Wait for and return the next distance in millimeters. `0.0` means
    /// nothing was in range.
    fn get_range(&mut self, instance: &mut Self::Instance) -> Result<f64, Self::Error>;
}
