//! Capability traits for stage controllers.
//!
//! Two views of the same hardware:
//!
//! - [`MotionController`]: the blocking, multi-axis operation set of one controller
//!   session. Every call blocks until the controller has answered (and, for motion, until
//!   the axis reports ready).
//! - [`Movable`]: the async single-axis capability consumed by orchestration code. It is
//!   implemented by running a [`MotionController`] on a blocking worker.

use crate::error::{AxisFault, StageResult};
use crate::motion::{ApplyResult, LoopMode, MotionCommand, SpeedProfile, Unit};
use crate::poller::PollReport;
use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Blocking Controller
// =============================================================================

/// Capability: blocking multi-axis motion control over one controller session.
///
/// # Contract
/// - Axis arguments are 1-based channels and are validated against the family's axis
///   count before anything is written.
/// - Motion operations (`move_to`, `move_relative`, `execute`, `move_axes`, `home`, `stop`)
///   return only after the ready-poll finished.
/// - Cached axis state changes only when an operation succeeds.
/// - Any transport failure poisons the session until `close` + `connect`.
pub trait MotionController: Send {
    /// Open the session on `resource` and perform the family handshake.
    fn connect(&mut self, resource: &str) -> StageResult<()>;

    /// Release the session. Idempotent; a no-op when not connected.
    fn close(&mut self);

    /// Whether a session is open.
    fn is_connected(&self) -> bool;

    /// Move `axis` to the absolute position `target` and wait until ready.
    ///
    /// Returns the new cached position.
    fn move_to(&mut self, target: i64, axis: u8) -> StageResult<i64>;

    /// Move `axis` by `delta` and wait until ready.
    ///
    /// Returns the new cached position, or `None` if the starting position was unknown.
    fn move_relative(&mut self, delta: i64, axis: u8) -> StageResult<Option<i64>>;

    /// Execute one staged motion command and wait until ready.
    fn execute(&mut self, command: MotionCommand) -> StageResult<Option<i64>>;

    /// Stage several motions, start them together and wait for every axis.
    fn move_axes(&mut self, commands: &[MotionCommand]) -> StageResult<()>;

    /// Return `axis` to its mechanical origin and wait until ready.
    fn home(&mut self, axis: u8) -> StageResult<()>;

    /// Decelerate `axis` to a stop and wait until it is quiescent.
    fn stop(&mut self, axis: u8) -> StageResult<()>;

    /// Set the speed profile of `axis`.
    fn set_speed(&mut self, initial: u32, final_speed: u32, acceleration_time: u32, axis: u8)
        -> StageResult<()>;

    /// Last known position of `axis`, without contacting the controller.
    fn position(&self, axis: u8) -> StageResult<Option<i64>>;

    /// Read the position of `axis` from the controller and update the cache.
    fn query_position(&mut self, axis: u8) -> StageResult<i64>;

    /// Poll `axis` until it reports ready.
    fn wait_ready(&mut self, axis: u8) -> StageResult<PollReport>;

    /// Designate the unit used for positions of `axis`.
    fn set_unit(&mut self, unit: Unit, axis: u8) -> StageResult<ApplyResult>;

    /// Switch `axis` between open and closed loop.
    fn set_loop(&mut self, mode: LoopMode, axis: u8) -> StageResult<ApplyResult>;

    /// Ask the controller for a pending fault on `axis`.
    fn check_error(&mut self, axis: u8) -> StageResult<Option<AxisFault>>;

    /// Cached speed profile of `axis`.
    fn speed_profile(&self, axis: u8) -> StageResult<Option<SpeedProfile>>;
}

// =============================================================================
// Async Capability
// =============================================================================

/// Capability: Motion Control
///
/// Single-axis view of a stage for async callers.
///
/// # Contract
/// - Positions are integers in the axis' current unit (pulses by default)
/// - `move_abs` and `move_rel` return once the axis has settled
/// - `position` reads the controller, not a cache
///
/// # Thread Safety
/// - All methods are async and require `&self` (immutable reference)
/// - Interior mutability (Mutex/RwLock) should be used for state
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to absolute position
    async fn move_abs(&self, position: i64) -> Result<()>;

    /// Move relative to current position
    async fn move_rel(&self, distance: i64) -> Result<()>;

    /// Get current position
    async fn position(&self) -> Result<i64>;

    /// Wait for motion to settle
    ///
    /// # Returns
    /// - Ok(()) when settled
    /// - Err on timeout or hardware error
    async fn wait_settled(&self) -> Result<()>;

    /// Stop motion
    ///
    /// # Default Implementation
    /// Returns an error indicating stop is not supported.
    async fn stop(&self) -> Result<()> {
        anyhow::bail!("Stop not supported by this device")
    }
}
