//! One arm → warm-up → sample loop → release cycle.

use core::fmt::{self, Debug};

#[cfg(feature = "tracing")]
use tracing::{debug, instrument, trace};

use crate::{SensorDriver, SensorError, SensorHandle, DEFAULT_SAMPLE_COUNT, PERIPHERAL_ADDR};

/// Where a session is placed on the bus and how many samples it reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// 7-bit bus address of the sensor.
    pub address: u8,
    /// Number of samples reported per session. The warm-up sample is not
    /// counted.
    pub sample_count: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: PERIPHERAL_ADDR,
            sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }
}

/// Lifecycle of a [`RangingSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handle open, ranging not started.
    Created,
    /// Ranging started, warm-up sample not yet taken.
    Armed,
    /// Warm-up discarded, reporting samples.
    Sampling,
    /// Every sample reported and the handle released.
    Completed,
    /// A fault ended the session; the handle has been released.
    Failed,
}

impl SessionState {
    /// Whether no further transition is possible.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub const fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Created, Armed)
                | (Armed, Sampling)
                | (Sampling, Completed)
                | (Created | Armed | Sampling, Failed)
        )
    }
}

/// A raw distance reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    /// Distance in millimeters, `0.0` if nothing echoed back.
    pub distance_mm: f64,
    /// Position in the session's sample sequence.
    pub ordinal: u32,
}

impl DistanceSample {
    /// Whether the driver reported that nothing is in range.
    #[inline]
    pub fn is_no_target(&self) -> bool {
        self.distance_mm == 0.0
    }

    /// Classify this reading.
    pub fn classify(&self) -> Reading {
        if self.is_no_target() {
            Reading::NoTargetPresent
        } else {
            Reading::TargetAt(self.distance_mm)
        }
    }
}

/// What a sample says about the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Nothing is in range. Not an error.
    NoTargetPresent,
    /// A target at this many millimeters, exactly as the driver reported it.
    TargetAt(f64),
}

/// A classified sample, as handed to the caller of [`RangingSession::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    /// Position in the session's sample sequence, starting at 0.
    pub ordinal: u32,
    /// The classification.
    pub reading: Reading,
}

impl From<DistanceSample> for Report {
    fn from(sample: DistanceSample) -> Self {
        Self {
            ordinal: sample.ordinal,
            reading: sample.classify(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reading {
            Reading::NoTargetPresent => f.write_str("Nothing Present"),
            Reading::TargetAt(mm) => write!(f, "{}: {} mm", self.ordinal, mm),
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome<E: Debug> {
    /// Every sample was reported and the handle released cleanly.
    Completed,
    /// A fault ended the session. Samples already reported stand.
    Failed {
        /// The fault.
        reason: SensorError<E>,
    },
}

impl<E: Debug> SessionOutcome<E> {
    /// Whether the session ran to completion.
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed)
    }

    /// Turn the outcome into a `Result`.
    pub fn into_result(self) -> Result<(), SensorError<E>> {
        match self {
            SessionOutcome::Completed => Ok(()),
            SessionOutcome::Failed { reason } => Err(reason),
        }
    }
}

/// A single ranging session over one exclusively owned [`SensorHandle`].
///
/// ```
/// # use tof_ranging::{RangingSession, SessionConfig, SensorDriver};
/// # struct Const;
/// # impl SensorDriver for Const {
/// #     type Instance = ();
/// #     type Error = ();
/// #     fn instantiate(&mut self, _: u8) -> Result<(), ()> { Ok(()) }
/// #     fn conclude(&mut self, _: ()) {}
/// #     fn start_ranging(&mut self, _: &mut ()) -> Result<bool, ()> { Ok(true) }
/// #     fn stop_ranging(&mut self, _: &mut ()) -> Result<bool, ()> { Ok(true) }
/// #     fn is_data_ready(&mut self, _: &mut ()) -> Result<bool, ()> { Ok(true) }
/// #     fn get_range(&mut self, _: &mut ()) -> Result<f64, ()> { Ok(250.0) }
/// # }
/// # let mut driver = Const;
/// let outcome = RangingSession::execute(&mut driver, &SessionConfig::default(), |report| {
///     println!("{report}");
/// });
/// assert!(outcome.is_completed());
/// ```
pub struct RangingSession<'d, D: SensorDriver> {
    handle: SensorHandle<'d, D>,
    sample_count: u32,
    state: SessionState,
}

impl<'d, D: SensorDriver> RangingSession<'d, D> {
    /// Open a handle at `config.address`.
    pub fn new(driver: &'d mut D, config: &SessionConfig) -> Result<Self, SensorError<D::Error>> {
        Ok(Self {
            handle: SensorHandle::open(driver, config.address)?,
            sample_count: config.sample_count,
            state: SessionState::Created,
        })
    }

    /// Open a session and run it. Failing to open is reported as a
    /// [`SessionOutcome::Failed`] like any other fault.
    pub fn execute<F>(driver: &'d mut D, config: &SessionConfig, on_report: F) -> SessionOutcome<D::Error>
    where
        F: FnMut(Report),
    {
        match Self::new(driver, config) {
            Ok(session) => session.run(on_report),
            Err(reason) => SessionOutcome::Failed { reason },
        }
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Arm, discard the warm-up sample, report `sample_count` classified
    /// samples in order, then release the handle.
    ///
    /// Each report is delivered before the next read is issued. The handle is
    /// released on every path, before the outcome is returned.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(address = self.handle.address(), samples = self.sample_count)))]
    pub fn run<F>(mut self, mut on_report: F) -> SessionOutcome<D::Error>
    where
        F: FnMut(Report),
    {
        let result = self.drive(&mut on_report);
        self.handle.release();

        match result {
            Ok(()) => {
                self.advance(SessionState::Completed);
                SessionOutcome::Completed
            }
            Err(reason) => {
                self.advance(SessionState::Failed);
                SessionOutcome::Failed { reason }
            }
        }
    }

    fn drive<F>(&mut self, on_report: &mut F) -> Result<(), SensorError<D::Error>>
    where
        F: FnMut(Report),
    {
        self.handle.arm()?;
        self.advance(SessionState::Armed);

        // the first reading after ranging starts is unreliable
        let _warm_up = self.handle.read_sample(0)?;
        #[cfg(feature = "tracing")]
        trace!(distance_mm = _warm_up.distance_mm, "discarded warm-up sample");
        self.advance(SessionState::Sampling);

        for ordinal in 0..self.sample_count {
            let sample = self.handle.read_sample(ordinal)?;
            on_report(sample.into());
        }

        Ok(())
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );

        #[cfg(feature = "tracing")]
        debug!(from = ?self.state, to = ?next, "session state");

        self.state = next;
    }
}
