//! Blocking controller session shared by all families.
//!
//! The [`Controller`] owns the transport, the per-axis cache and the poll settings, and
//! delegates every wire format decision to its [`FamilyProtocol`]. Operations run in
//! strict request/reply order on the calling thread; a motion call returns once the
//! ready-poll has finished.
//!
//! # Session lifecycle
//!
//! ```text
//! Closed --connect--> Open --I/O failure--> Poisoned
//!   ^                   |                      |
//!   +------close--------+---------close--------+
//! ```
//!
//! A poisoned session rejects every operation with `TransportError::Poisoned` until it is
//! closed and connected again.

use crate::protocol::{FamilyProtocol, Protocol, Query};
use crate::tracker::AxisTracker;
use stage_core::{
    ApplyResult, AxisFault, AxisNames, ControllerConfig, DecodeError, DeviceStatus, Family,
    LineTransport, LoopMode, MotionCommand, MotionController, PollReport, PollSettings, PollState,
    ReadyPoller, ResourceManager, SerialResourceManager, SpeedProfile, StageError, StageResult,
    Target, TransportError, Unit,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Label used for sessions attached with [`Controller::from_transport`].
const ATTACHED: &str = "attached";

/// Blocking session with one OptoSigma controller.
pub struct Controller {
    protocol: FamilyProtocol,
    resources: Arc<dyn ResourceManager>,
    resource: Option<String>,
    transport: Option<Box<dyn LineTransport>>,
    poisoned: bool,
    tracker: AxisTracker,
    names: AxisNames,
    poll: PollSettings,
    io_timeout: Duration,
    last_poll: Option<PollReport>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("family", &self.family())
            .field("resource", &self.resource)
            .field("connected", &self.transport.is_some())
            .field("poisoned", &self.poisoned)
            .field("poll", &self.poll)
            .finish()
    }
}

impl Controller {
    /// Unconnected controller opening local serial ports.
    pub fn new(family: Family) -> Self {
        Self::with_resources(family, Arc::new(SerialResourceManager))
    }

    /// Unconnected controller opening sessions through `resources`.
    pub fn with_resources(family: Family, resources: Arc<dyn ResourceManager>) -> Self {
        let protocol = FamilyProtocol::from(family);
        Self {
            protocol,
            resources,
            resource: None,
            transport: None,
            poisoned: false,
            tracker: AxisTracker::new(family.axis_count(), Unit::Pulse),
            names: AxisNames::defaults(family),
            poll: PollSettings::default(),
            io_timeout: Duration::from_secs(1),
            last_poll: None,
        }
    }

    /// Unconnected controller configured from `config`.
    pub fn from_config(
        config: &ControllerConfig,
        resources: Arc<dyn ResourceManager>,
    ) -> StageResult<Self> {
        config.validate()?;
        Ok(Self::with_resources(config.family, resources)
            .with_poll_settings(config.poll_settings())
            .with_io_timeout(config.io_timeout())
            .with_axis_names(config.axis_names()?)
            .with_default_unit(config.default_unit))
    }

    /// Controller over an already open transport; no handshake is sent.
    pub fn from_transport(family: Family, transport: Box<dyn LineTransport>) -> Self {
        let mut controller = Self::new(family);
        controller.transport = Some(transport);
        controller.resource = Some(ATTACHED.to_string());
        controller
    }

    /// Replace the ready-poll interval and budget.
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Replace the per-line I/O timeout used for new sessions.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Replace the symbolic axis names.
    pub fn with_axis_names(mut self, names: AxisNames) -> Self {
        self.names = names;
        self
    }

    /// Designate `unit` on every axis, when the family supports it.
    pub fn with_default_unit(mut self, unit: Unit) -> Self {
        if self.protocol.supports_unit(unit) {
            for axis in 1..=self.family().axis_count() {
                self.tracker.set_unit(axis, unit);
            }
        }
        self
    }

    /// Controller family.
    pub fn family(&self) -> Family {
        self.protocol.family()
    }

    /// Resource identifier of the open session.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Ready-poll settings in use.
    pub fn poll_settings(&self) -> PollSettings {
        self.poll
    }

    /// Per-axis cache.
    pub fn tracker(&self) -> &AxisTracker {
        &self.tracker
    }

    /// Report of the most recent ready-poll, including failed ones.
    pub fn last_poll(&self) -> Option<&PollReport> {
        self.last_poll.as_ref()
    }

    /// Whether an I/O failure poisoned the session.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Resolve a symbolic axis name (`"X"`, `"Axis2"`) or channel number.
    pub fn resolve_axis(&self, axis: &str) -> StageResult<u8> {
        self.names.resolve(axis)
    }

    /// Stop every axis at once and wait until all are quiescent.
    ///
    /// Families without a dedicated all-axes command get one stop line per axis.
    #[instrument(skip(self), fields(family = %self.family()), err)]
    pub fn emergency_stop(&mut self) -> StageResult<()> {
        match self.protocol.emergency_stop_command() {
            Some(line) => self.write(line)?,
            None => {
                for axis in 1..=self.family().axis_count() {
                    let line = self.protocol.stop_command(axis);
                    self.write(&line)?;
                }
            }
        }
        for axis in 1..=self.family().axis_count() {
            self.poll_ready(axis)?;
        }
        self.tracker.invalidate_all();
        Ok(())
    }

    /// Read the speed profile of `axis` from the controller.
    ///
    /// Families without speed readback return the cached profile.
    #[instrument(skip(self), fields(family = %self.family()), err)]
    pub fn query_speed(&mut self, axis: u8) -> StageResult<Option<SpeedProfile>> {
        self.check_axis(axis)?;
        let Some(query) = self.protocol.speed_query(axis) else {
            return Ok(self.tracker.speed_profile(axis));
        };
        let protocol = self.protocol;
        let profile = self.read_quirked(&query, |reply| protocol.decode_speed(reply))?;
        self.tracker.set_speed_profile(axis, profile);
        Ok(Some(profile))
    }

    /// Read the loop mode of `axis`; `None` when the family has no loop control.
    #[instrument(skip(self), fields(family = %self.family()), err)]
    pub fn query_loop(&mut self, axis: u8) -> StageResult<Option<LoopMode>> {
        self.check_axis(axis)?;
        let Some(query) = self.protocol.loop_query(axis) else {
            return Ok(None);
        };
        let reply = self.ask_query(&query)?;
        let mode = self
            .protocol
            .decode_loop(&reply)
            .map_err(|e| StageError::decode(&query.command, e))?;
        self.tracker.set_loop_mode(axis, mode);
        Ok(Some(mode))
    }

    // =========================================================================
    // Session I/O
    // =========================================================================

    fn check_axis(&self, axis: u8) -> StageResult<u8> {
        self.family().validate_axis(axis)
    }

    fn session(&mut self) -> StageResult<&mut Box<dyn LineTransport>> {
        if self.poisoned {
            let resource = self.resource.clone().unwrap_or_default();
            return Err(TransportError::Poisoned(resource).into());
        }
        self.transport
            .as_mut()
            .ok_or_else(|| StageError::from(TransportError::NotConnected))
    }

    fn track_io<T>(&mut self, result: Result<T, TransportError>) -> StageResult<T> {
        result.map_err(|err| {
            if err.requires_reopen() {
                warn!(family = %self.family(), error = %err, "Session poisoned by I/O failure");
                self.poisoned = true;
            }
            StageError::from(err)
        })
    }

    fn write(&mut self, line: &str) -> StageResult<()> {
        let result = self.session()?.write_line(line);
        self.track_io(result)?;
        debug!(family = %self.family(), line, "Sent");
        Ok(())
    }

    fn ask(&mut self, line: &str) -> StageResult<String> {
        let result = self.session()?.query_line(line);
        let reply = self.track_io(result)?;
        debug!(family = %self.family(), line, reply = %reply, "Queried");
        Ok(reply)
    }

    /// Send a query, twice when the family only answers the repeat authoritatively.
    fn ask_query(&mut self, query: &Query) -> StageResult<String> {
        if query.repeat {
            self.ask(&query.command)?;
        }
        self.ask(&query.command)
    }

    /// Read a value through a double query, re-querying undecodable replies until the
    /// poll budget runs out. Single queries are decoded once.
    fn read_quirked<T>(
        &mut self,
        query: &Query,
        decode: impl Fn(&str) -> Result<T, DecodeError>,
    ) -> StageResult<T> {
        let start = Instant::now();
        loop {
            let reply = self.ask_query(query)?;
            match decode(&reply) {
                Ok(value) => return Ok(value),
                Err(err) if query.repeat && start.elapsed() < self.poll.timeout => {
                    debug!(command = %query.command, error = %err, "Undecodable reply, querying again");
                    thread::sleep(self.poll.interval);
                }
                Err(err) => return Err(StageError::decode(&query.command, err)),
            }
        }
    }

    fn read_status(&mut self, axis: u8) -> StageResult<DeviceStatus> {
        let query = self.protocol.status_query(axis);
        let reply = self.ask_query(&query)?;
        self.protocol
            .decode_status(axis, &reply)
            .map_err(|e| StageError::decode(&query.command, e))
    }

    /// Ready-poll `axis`; non-ready outcomes become errors.
    fn poll_ready(&mut self, axis: u8) -> StageResult<PollReport> {
        let poller = ReadyPoller::new(self.poll);
        let protocol = self.protocol;
        let report = poller.run(
            || self.read_status(axis),
            |status| protocol.describe_fault(axis, status),
        )?;
        self.last_poll = Some(report.clone());

        if report.state == PollState::TimedOut {
            self.log_pending_fault(axis);
        }
        report.into_result(axis, self.poll.timeout)
    }

    /// Best-effort error check after a poll timeout, for the log only.
    fn log_pending_fault(&mut self, axis: u8) {
        match self.check_error(axis) {
            Ok(Some(fault)) => warn!(axis, %fault, "Pending fault after poll timeout"),
            Ok(None) => debug!(axis, "No pending fault after poll timeout"),
            Err(err) => debug!(axis, error = %err, "Fault check after poll timeout failed"),
        }
    }

    // =========================================================================
    // Motion helpers
    // =========================================================================

    fn validate_commands(&self, commands: &[MotionCommand]) -> StageResult<()> {
        if commands.is_empty() {
            return Err(StageError::Validation("no motion commands given".into()));
        }
        let mut seen = BTreeSet::new();
        for command in commands {
            self.check_axis(command.axis)?;
            if !seen.insert(command.axis) {
                return Err(StageError::Validation(format!(
                    "axis {} appears more than once in one motion",
                    command.axis
                )));
            }
        }
        Ok(())
    }

    /// Position the cache will hold once `command` completed.
    fn expected_position(&self, command: &MotionCommand) -> Option<i64> {
        match command.target {
            Target::Absolute(position) => Some(position),
            Target::Relative(delta) => self
                .tracker
                .position(command.axis)
                .and_then(|position| position.checked_add(delta)),
        }
    }

    fn apply_speed(&mut self, axis: u8, profile: SpeedProfile) -> StageResult<()> {
        let line = self.protocol.speed_command(axis, &profile);
        self.write(&line)?;
        self.tracker.set_speed_profile(axis, profile);
        Ok(())
    }

    fn stage(&mut self, command: &MotionCommand) -> StageResult<()> {
        if let Some(profile) = command.speed {
            self.apply_speed(command.axis, profile)?;
        }
        let unit = self.tracker.unit(command.axis);
        let line = self.protocol.stage_command(command.axis, command.target, unit);
        self.write(&line)
    }

    fn settle(&mut self, axis: u8, position: Option<i64>) {
        match position {
            Some(position) => self.tracker.update_position(axis, position),
            None => self.tracker.invalidate_position(axis),
        }
    }
}

impl MotionController for Controller {
    #[instrument(skip(self), fields(family = %self.family()), err)]
    fn connect(&mut self, resource: &str) -> StageResult<()> {
        self.close();

        let settings = self.protocol.serial_settings().with_timeout(self.io_timeout);
        let transport = self.resources.open(resource, &settings)?;
        self.transport = Some(transport);
        self.resource = Some(resource.to_string());
        self.poisoned = false;

        for line in self.protocol.handshake() {
            self.write(line)?;
        }
        info!(resource, family = %self.family(), "Connected to OptoSigma controller");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            info!(
                resource = self.resource.as_deref().unwrap_or_default(),
                family = %self.family(),
                "Controller session closed"
            );
        }
        self.resource = None;
        self.poisoned = false;
    }

    fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn move_to(&mut self, target: i64, axis: u8) -> StageResult<i64> {
        self.execute(MotionCommand::absolute(axis, target))?;
        Ok(target)
    }

    fn move_relative(&mut self, delta: i64, axis: u8) -> StageResult<Option<i64>> {
        self.execute(MotionCommand::relative(axis, delta))
    }

    #[instrument(skip(self), fields(family = %self.family()), err)]
    fn execute(&mut self, command: MotionCommand) -> StageResult<Option<i64>> {
        self.validate_commands(std::slice::from_ref(&command))?;
        let expected = self.expected_position(&command);

        self.stage(&command)?;
        if let Some(go) = self.protocol.go_command() {
            self.write(go)?;
        }
        self.poll_ready(command.axis)?;

        self.settle(command.axis, expected);
        Ok(expected)
    }

    #[instrument(skip(self), fields(family = %self.family()), err)]
    fn move_axes(&mut self, commands: &[MotionCommand]) -> StageResult<()> {
        self.validate_commands(commands)?;
        let expected: Vec<(u8, Option<i64>)> = commands
            .iter()
            .map(|command| (command.axis, self.expected_position(command)))
            .collect();

        for command in commands {
            self.stage(command)?;
        }
        if let Some(go) = self.protocol.go_command() {
            self.write(go)?;
        }

        for (axis, position) in expected {
            self.poll_ready(axis)?;
            self.settle(axis, position);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(family = %self.family()), err)]
    fn home(&mut self, axis: u8) -> StageResult<()> {
        self.check_axis(axis)?;
        let line = self.protocol.home_command(axis);
        self.write(&line)?;
        self.poll_ready(axis)?;
        self.tracker.update_position(axis, 0);
        Ok(())
    }

    #[instrument(skip(self), fields(family = %self.family()), err)]
    fn stop(&mut self, axis: u8) -> StageResult<()> {
        self.check_axis(axis)?;
        let line = self.protocol.stop_command(axis);
        self.write(&line)?;
        self.poll_ready(axis)?;
        self.tracker.invalidate_position(axis);
        Ok(())
    }

    #[instrument(skip(self), fields(family = %self.family()), err)]
    fn set_speed(
        &mut self,
        initial: u32,
        final_speed: u32,
        acceleration_time: u32,
        axis: u8,
    ) -> StageResult<()> {
        self.check_axis(axis)?;
        let profile = SpeedProfile::new(initial, final_speed, acceleration_time)?;
        self.apply_speed(axis, profile)
    }

    fn position(&self, axis: u8) -> StageResult<Option<i64>> {
        self.check_axis(axis)?;
        Ok(self.tracker.position(axis))
    }

    #[instrument(skip(self), fields(family = %self.family()), err)]
    fn query_position(&mut self, axis: u8) -> StageResult<i64> {
        self.check_axis(axis)?;
        let query = self.protocol.position_query(axis);
        let protocol = self.protocol;
        let position = self.read_quirked(&query, |reply| protocol.decode_position(axis, reply))?;
        self.tracker.update_position(axis, position);
        Ok(position)
    }

    fn wait_ready(&mut self, axis: u8) -> StageResult<PollReport> {
        self.check_axis(axis)?;
        self.poll_ready(axis)
    }

    fn set_unit(&mut self, unit: Unit, axis: u8) -> StageResult<ApplyResult> {
        self.check_axis(axis)?;
        if !self.protocol.supports_unit(unit) {
            debug!(family = %self.family(), axis, %unit, "Unit not supported");
            return Ok(ApplyResult::Unsupported("unit"));
        }
        self.tracker.set_unit(axis, unit);
        Ok(ApplyResult::Applied)
    }

    #[instrument(skip(self), fields(family = %self.family()), err)]
    fn set_loop(&mut self, mode: LoopMode, axis: u8) -> StageResult<ApplyResult> {
        self.check_axis(axis)?;
        let Some(line) = self.protocol.loop_command(axis, mode) else {
            return Ok(ApplyResult::Unsupported("loop"));
        };
        self.write(&line)?;
        self.tracker.set_loop_mode(axis, mode);
        Ok(ApplyResult::Applied)
    }

    #[instrument(skip(self), fields(family = %self.family()), err)]
    fn check_error(&mut self, axis: u8) -> StageResult<Option<AxisFault>> {
        self.check_axis(axis)?;
        let query = self.protocol.error_query(axis);
        let reply = self.ask_query(&query)?;
        self.protocol
            .decode_fault(axis, &reply)
            .map_err(|e| StageError::decode(&query.command, e))
    }

    fn speed_profile(&self, axis: u8) -> StageResult<Option<SpeedProfile>> {
        self.check_axis(axis)?;
        Ok(self.tracker.speed_profile(axis))
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.close();
    }
}
