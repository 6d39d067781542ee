//! Repeated ranging sessions against one driver.

use core::{num::NonZeroU32, time::Duration};

#[cfg(feature = "tracing")]
use tracing::{error, info, instrument};

use crate::{RangingSession, Report, SensorDriver, SensorError, SessionConfig, SessionOutcome};

/// What the poll loop does after a session completes. A failed session always
/// ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Run one session and stop.
    #[default]
    SingleSession,
    /// Start a fresh session after each completed one, waiting `delay` in
    /// between.
    Repeat {
        /// Pause between sessions.
        delay: Duration,
        /// Stop after this many completed sessions. `None` runs until a
        /// session fails, or until the future of
        /// [`PollLoop::run_async`] is dropped.
        sessions: Option<NonZeroU32>,
    },
}

/// Totals for a run that ended without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    /// Completed sessions.
    pub sessions: u32,
    /// Samples reported across all sessions.
    pub samples: u64,
}

/// Drives [`RangingSession`]s until the [`Policy`] is satisfied or one fails.
///
/// ```
/// # use tof_ranging::{PollLoop, SensorDriver};
/// # struct Empty;
/// # impl SensorDriver for Empty {
/// #     type Instance = ();
/// #     type Error = &'static str;
/// #     fn instantiate(&mut self, _: u8) -> Result<(), Self::Error> { Ok(()) }
/// #     fn conclude(&mut self, _: ()) {}
/// #     fn start_ranging(&mut self, _: &mut ()) -> Result<bool, Self::Error> { Ok(true) }
/// #     fn stop_ranging(&mut self, _: &mut ()) -> Result<bool, Self::Error> { Ok(true) }
/// #     fn is_data_ready(&mut self, _: &mut ()) -> Result<bool, Self::Error> { Ok(true) }
/// #     fn get_range(&mut self, _: &mut ()) -> Result<f64, Self::Error> { Ok(0.0) }
/// # }
/// let mut poll = PollLoop::new(Empty);
/// let summary = poll.run(|report| println!("{report}"))?;
/// assert_eq!(summary.samples, 10);
/// # Ok::<(), tof_ranging::SensorError<&'static str>>(())
/// ```
pub struct PollLoop<D: SensorDriver> {
    driver: D,
    config: SessionConfig,
    policy: Policy,
}

impl<D: SensorDriver> PollLoop<D> {
    /// A loop running the reference session once.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            config: SessionConfig::default(),
            policy: Policy::default(),
        }
    }

    /// Replace the per-session configuration.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the policy.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// The driver sessions are run against.
    #[inline]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Give back the driver.
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Run sessions, blocking between them per the [`Policy`].
    ///
    /// # Errors
    ///
    /// The reason the first failed session failed. Reports it already made
    /// stand.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(policy = ?self.policy)))]
    pub fn run<F>(&mut self, mut on_report: F) -> Result<Summary, SensorError<D::Error>>
    where
        F: FnMut(&Report),
    {
        let mut summary = Summary::default();

        loop {
            let outcome = self.session(&mut summary, &mut on_report);
            self.settle(outcome, &mut summary)?;

            match self.pause_after(summary.sessions) {
                Some(delay) => std::thread::sleep(delay),
                None => return Ok(summary),
            }
        }
    }

    /// [`Self::run`], waiting between sessions without blocking the runtime.
    /// Sessions themselves still block.
    ///
    /// ```
    /// # tokio_test::block_on(async {
    /// # use core::{num::NonZeroU32, time::Duration};
    /// # use tof_ranging::{PollLoop, Policy, SensorDriver};
    /// # struct Far;
    /// # impl SensorDriver for Far {
    /// #     type Instance = ();
    /// #     type Error = &'static str;
    /// #     fn instantiate(&mut self, _: u8) -> Result<(), Self::Error> { Ok(()) }
    /// #     fn conclude(&mut self, _: ()) {}
    /// #     fn start_ranging(&mut self, _: &mut ()) -> Result<bool, Self::Error> { Ok(true) }
    /// #     fn stop_ranging(&mut self, _: &mut ()) -> Result<bool, Self::Error> { Ok(true) }
    /// #     fn is_data_ready(&mut self, _: &mut ()) -> Result<bool, Self::Error> { Ok(true) }
    /// #     fn get_range(&mut self, _: &mut ()) -> Result<f64, Self::Error> { Ok(900.0) }
    /// # }
    /// let mut poll = PollLoop::new(Far).with_policy(Policy::Repeat {
    ///     delay: Duration::from_millis(5),
    ///     sessions: NonZeroU32::new(3),
    /// });
    /// let summary = poll.run_async(|report| println!("{report}")).await?;
    /// assert_eq!(summary.sessions, 3);
    /// # Ok::<(), tof_ranging::SensorError<&'static str>>(())
    /// # }).unwrap();
    /// ```
    #[cfg(feature = "tokio")]
    pub async fn run_async<F>(&mut self, mut on_report: F) -> Result<Summary, SensorError<D::Error>>
    where
        F: FnMut(&Report),
    {
        let mut summary = Summary::default();

        loop {
            let outcome = self.session(&mut summary, &mut on_report);
            self.settle(outcome, &mut summary)?;

            match self.pause_after(summary.sessions) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Ok(summary),
            }
        }
    }

    fn session<F>(&mut self, summary: &mut Summary, on_report: &mut F) -> SessionOutcome<D::Error>
    where
        F: FnMut(&Report),
    {
        RangingSession::execute(&mut self.driver, &self.config, |report| {
            #[cfg(feature = "tracing")]
            info!("{report}");

            summary.samples += 1;
            on_report(&report);
        })
    }

    fn settle(
        &self,
        outcome: SessionOutcome<D::Error>,
        summary: &mut Summary,
    ) -> Result<(), SensorError<D::Error>> {
        match outcome {
            SessionOutcome::Completed => {
                summary.sessions += 1;
                Ok(())
            }
            SessionOutcome::Failed { reason } => {
                #[cfg(feature = "tracing")]
                error!(kind = reason.kind(), "{reason}");

                Err(reason)
            }
        }
    }

    /// How long to wait before the next session, or `None` to stop.
    fn pause_after(&self, completed: u32) -> Option<Duration> {
        match self.policy {
            Policy::SingleSession => None,
            Policy::Repeat { sessions: Some(limit), .. } if completed >= limit.get() => None,
            Policy::Repeat { delay, .. } => Some(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Call, Fault, FakeDriver};

    fn repeat(sessions: u32) -> Policy {
        Policy::Repeat {
            delay: Duration::ZERO,
            sessions: NonZeroU32::new(sessions),
        }
    }

    #[test]
    fn single_session_then_stop() {
        // enough script for two sessions; only one may run
        let mut driver = FakeDriver::scenario();
        driver.ranges.extend(FakeDriver::scenario().ranges);
        let mut poll = PollLoop::new(driver);

        let mut lines = Vec::new();
        let summary = poll.run(|r| lines.push(r.to_string())).unwrap();

        assert_eq!(summary, Summary { sessions: 1, samples: 10 });
        assert_eq!(lines[0], "Nothing Present");
        assert_eq!(lines[1], "1: 5 mm");
        assert_eq!(lines[9], "9: 6.5 mm");

        let driver = poll.into_driver();
        assert_eq!(driver.count(|c| matches!(c, Call::Instantiate(0x29))), 1);
        assert_eq!(driver.ranges.len(), 11);
    }

    #[test]
    fn repeat_runs_fresh_sessions() {
        let mut driver = FakeDriver::scenario();
        driver.ranges.extend(FakeDriver::scenario().ranges);
        let mut poll = PollLoop::new(driver).with_policy(repeat(2));

        let mut ordinals = Vec::new();
        let summary = poll.run(|r| ordinals.push(r.ordinal)).unwrap();

        assert_eq!(summary, Summary { sessions: 2, samples: 20 });
        assert_eq!(&ordinals[..10], &ordinals[10..]);
        assert_eq!(poll.driver().concludes(), 2);
        assert_eq!(
            poll.driver().calls.iter().filter(|c| matches!(c, Call::Conclude(_))).collect::<Vec<_>>(),
            [&Call::Conclude(1), &Call::Conclude(2)]
        );
    }

    #[test]
    fn failure_ends_an_unbounded_run() {
        // one full session, then the second runs dry after its warm-up and two samples
        let mut driver = FakeDriver::scenario();
        driver.ranges.extend([1.0, 2.0, 3.0].map(Ok));
        let mut poll = PollLoop::new(driver).with_policy(repeat(0));

        let mut count = 0;
        let err = poll.run(|_| count += 1).unwrap_err();

        assert!(matches!(err, SensorError::Read(Fault("script exhausted"))));
        assert_eq!(count, 12);
        assert_eq!(poll.driver().concludes(), 2);
    }

    #[test]
    fn instantiation_failure_is_terminal() {
        let mut driver = FakeDriver::scenario();
        driver.fail_instantiate = true;
        let mut poll = PollLoop::new(driver).with_policy(repeat(5));

        let err = poll.run(|_| panic!("nothing to report")).unwrap_err();
        assert_eq!(err.kind(), "InstantiationError");
        assert_eq!(poll.driver().calls.len(), 1);
    }

    #[test]
    fn custom_address_and_count() {
        let mut poll = PollLoop::new(FakeDriver::with_ranges([1.0, 2.0, 3.0])).with_config(SessionConfig {
            address: 0x30,
            sample_count: 2,
        });

        let summary = poll.run(|_| {}).unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(poll.driver().calls[0], Call::Instantiate(0x30));
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn async_repeat() {
        let mut driver = FakeDriver::scenario();
        driver.ranges.extend(FakeDriver::scenario().ranges);
        let mut poll = PollLoop::new(driver).with_policy(Policy::Repeat {
            delay: Duration::from_millis(1),
            sessions: NonZeroU32::new(2),
        });

        let summary = poll.run_async(|_| {}).await.unwrap();
        assert_eq!(summary.sessions, 2);
        assert_eq!(poll.driver().concludes(), 2);
    }
}
