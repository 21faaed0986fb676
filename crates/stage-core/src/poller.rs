//! Ready polling.
//!
//! After a motion command the controller is asked for the axis status at a fixed interval
//! until it reports ready, reports a fault, or the time budget runs out. The poller owns
//! no I/O: it is driven by a status closure supplied by the controller, which keeps it
//! testable without hardware and lets the caller decide what to do with each outcome.

use crate::error::{AxisFault, StageError, StageResult};
use crate::motion::DeviceStatus;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Interval and budget of a ready-poll.
///
/// # Example
///
/// ```rust
/// use stage_core::PollSettings;
/// use std::time::Duration;
///
/// let settings = PollSettings::default();
/// assert_eq!(settings.interval, Duration::from_millis(200));
/// assert_eq!(settings.timeout, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between two status queries.
    pub interval: Duration,
    /// Total budget measured from the start of the poll.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            timeout: Duration::from_secs(60),
        }
    }
}

/// State of a ready-poll.
///
/// `Polling` is the only non-terminal state; [`ReadyPoller::run`] always returns a report
/// in one of the terminal states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Still waiting for the axis.
    Polling,
    /// The axis reported ready.
    Ready,
    /// The budget elapsed while the axis stayed busy.
    TimedOut,
    /// The controller reported a fault.
    DeviceError(AxisFault),
}

impl PollState {
    /// Whether polling has finished.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

/// Result of a ready-poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Final state.
    pub state: PollState,
    /// Number of status queries sent.
    pub polls: u32,
    /// Time from the first query to the terminal decision.
    pub elapsed: Duration,
}

impl PollReport {
    /// Whether the axis reported ready.
    pub fn is_ready(&self) -> bool {
        self.state == PollState::Ready
    }

    /// Convert a non-ready outcome into the matching [`StageError`].
    pub fn into_result(self, axis: u8, budget: Duration) -> StageResult<PollReport> {
        match self.state {
            PollState::Ready => Ok(self),
            PollState::DeviceError(fault) => Err(StageError::Axis(fault)),
            PollState::TimedOut | PollState::Polling => Err(StageError::Timeout {
                axis,
                budget,
                polls: self.polls,
            }),
        }
    }
}

/// Repeats a status query until the axis is ready, faulted, or out of time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadyPoller {
    settings: PollSettings,
}

impl ReadyPoller {
    /// Create a poller with the given interval and budget.
    pub fn new(settings: PollSettings) -> Self {
        Self { settings }
    }

    /// Interval and budget in use.
    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Poll until a terminal state is reached.
    ///
    /// `query` performs one status query. `describe` turns a fault status
    /// (`LimitStop`/`Error`) into the [`AxisFault`] stored in the report. Errors returned
    /// by `query` (transport or decode failures) abort the poll and are propagated
    /// unchanged.
    ///
    /// The budget is checked after each busy reply and before sleeping, so a zero budget
    /// still sends exactly one query.
    pub fn run<Q, D>(&self, mut query: Q, describe: D) -> StageResult<PollReport>
    where
        Q: FnMut() -> StageResult<DeviceStatus>,
        D: Fn(&DeviceStatus) -> AxisFault,
    {
        let start = Instant::now();
        let mut polls = 0u32;
        let mut state = PollState::Polling;

        while !state.is_terminal() {
            let status = query()?;
            polls += 1;

            state = match status {
                DeviceStatus::Ready => PollState::Ready,
                DeviceStatus::Busy => {
                    if start.elapsed() >= self.settings.timeout {
                        warn!(
                            polls,
                            budget_ms = self.settings.timeout.as_millis() as u64,
                            "Axis still busy when the poll budget ran out"
                        );
                        PollState::TimedOut
                    } else {
                        thread::sleep(self.settings.interval);
                        PollState::Polling
                    }
                }
                fault => PollState::DeviceError(describe(&fault)),
            };
        }

        let report = PollReport {
            state,
            polls,
            elapsed: start.elapsed(),
        };
        debug!(state = ?report.state, polls = report.polls, elapsed_ms = report.elapsed.as_millis() as u64, "Ready-poll finished");
        Ok(report)
    }
}
