//! Scripted in-memory driver for unit tests.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use crate::SensorDriver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fault(pub &'static str);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Instantiate(u8),
    Conclude(u32),
    StartRanging(u32),
    StopRanging(u32),
    IsDataReady(u32),
    GetRange(u32),
    /// Written by a report callback, not by the driver.
    Report(u32),
}

#[derive(Debug)]
pub(crate) struct Instance(u32);

#[derive(Debug, Default)]
pub(crate) struct FakeDriver {
    pub calls: Vec<Call>,
    pub ranges: VecDeque<Result<f64, Fault>>,
    pub fail_instantiate: bool,
    pub start: Option<Result<bool, Fault>>,
    pub stop: Option<Result<bool, Fault>>,
    /// Shared copy of `calls` that report callbacks can append to.
    pub journal: Rc<RefCell<Vec<Call>>>,
    next_id: u32,
}

impl FakeDriver {
    pub fn with_ranges<I: IntoIterator<Item = f64>>(ranges: I) -> Self {
        Self {
            ranges: ranges.into_iter().map(Ok).collect(),
            ..Self::default()
        }
    }

    /// Reference scenario: a warm-up reading followed by ten samples.
    pub fn scenario() -> Self {
        Self::with_ranges([12.0, 0.0, 5.0, 5.1, 0.0, 7.2, 7.1, 7.0, 0.0, 0.0, 6.5])
    }

    fn record(&mut self, call: Call) {
        self.calls.push(call);
        self.journal.borrow_mut().push(call);
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn concludes(&self) -> usize {
        self.count(|c| matches!(c, Call::Conclude(_)))
    }

    pub fn reads(&self) -> usize {
        self.count(|c| matches!(c, Call::GetRange(_)))
    }
}

impl SensorDriver for FakeDriver {
    type Instance = Instance;
    type Error = Fault;

    fn instantiate(&mut self, address: u8) -> Result<Instance, Fault> {
        self.record(Call::Instantiate(address));
        if self.fail_instantiate {
            return Err(Fault("not present"));
        }
        self.next_id += 1;
        Ok(Instance(self.next_id))
    }

    fn conclude(&mut self, instance: Instance) {
        self.record(Call::Conclude(instance.0));
    }

    fn start_ranging(&mut self, instance: &mut Instance) -> Result<bool, Fault> {
        self.record(Call::StartRanging(instance.0));
        self.start.clone().unwrap_or(Ok(true))
    }

    fn stop_ranging(&mut self, instance: &mut Instance) -> Result<bool, Fault> {
        self.record(Call::StopRanging(instance.0));
        self.stop.clone().unwrap_or(Ok(true))
    }

    fn is_data_ready(&mut self, instance: &mut Instance) -> Result<bool, Fault> {
        self.record(Call::IsDataReady(instance.0));
        Ok(!self.ranges.is_empty())
    }

    fn get_range(&mut self, instance: &mut Instance) -> Result<f64, Fault> {
        self.record(Call::GetRange(instance.0));
        self.ranges.pop_front().unwrap_or(Err(Fault("script exhausted")))
    }
}
