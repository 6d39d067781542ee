//! Faults that end a ranging session.

use core::fmt::Debug;

/// Why the driver did not do what was asked.
#[derive(Debug, thiserror::Error)]
pub enum Refusal<E: Debug> {
    /// The driver answered the call with `false`.
    #[error("driver refused")]
    Refused,
    /// The call itself failed on the bus.
    #[error("bus error: {0:?}")]
    Bus(E),
}

/// Errors raised by a [`crate::SensorHandle`] or a [`crate::RangingSession`].
///
/// `E` is the error type of the underlying [`crate::SensorDriver`].
#[derive(Debug, thiserror::Error)]
pub enum SensorError<E: Debug> {
    /// The driver could not produce a sensor instance at `address`.
    #[error("no sensor instance at address {address:#04x}: {cause:?}")]
    Instantiation {
        /// 7-bit bus address that was requested.
        address: u8,
        /// Driver-specific reason.
        cause: E,
    },

    /// Ranging could not be started.
    #[error("ranging could not be started: {0}")]
    Arm(Refusal<E>),

    /// A sample could not be read.
    #[error("sample read failed: {0:?}")]
    Read(E),

    /// A sample was requested from a handle that is not armed. This is a
    /// contract violation by the caller, not a runtime condition.
    #[error("sample requested before ranging was started")]
    NotArmed,

    /// The handle was used after its instance was released.
    #[error("sensor handle already released")]
    Released,
}

impl<E: Debug> SensorError<E> {
    /// Short, stable name of the error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            SensorError::Instantiation { .. } => "InstantiationError",
            SensorError::Arm(_) => "ArmError",
            SensorError::Read(_) => "ReadError",
            SensorError::NotArmed => "NotArmedError",
            SensorError::Released => "ReleasedError",
        }
    }
}
