//! `stage-core`
//!
//! Core types and traits shared by the OptoSigma stage controller drivers.
//!
//! The crate is deliberately free of any family-specific wire format. It provides:
//!
//! - **Transport**: a line-oriented session over a serial port ([`LineTransport`],
//!   [`SerialTransport`]) and the [`ResourceManager`] that opens one from a
//!   resource identifier such as `ASRL3::INSTR` or `/dev/ttyUSB0`.
//! - **Motion vocabulary**: [`Unit`], [`LoopMode`], [`SpeedProfile`], [`MotionCommand`],
//!   [`DeviceStatus`] and the [`Family`] identifier of each supported controller.
//! - **Ready polling**: [`ReadyPoller`] turns repeated status queries into a
//!   [`PollReport`] with an explicit terminal [`PollState`].
//! - **Capabilities**: the blocking [`MotionController`] operation set and the async
//!   [`Movable`] capability used by higher layers.
//! - **Errors**: [`StageError`] and [`TransportError`], built on `thiserror`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stage_core::{PollSettings, ReadyPoller, DeviceStatus};
//! use std::time::Duration;
//!
//! let poller = ReadyPoller::new(PollSettings {
//!     interval: Duration::from_millis(10),
//!     timeout: Duration::from_secs(1),
//! });
//! let report = poller.run(|| Ok(DeviceStatus::Ready), |_| unreachable!());
//! assert!(report.is_ok());
//! ```

pub mod axis;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod motion;
pub mod poller;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use axis::{AxisNames, Family};
pub use capabilities::{MotionController, Movable};
pub use config::{ControllerConfig, PollConfig};
pub use error::{AxisFault, DecodeError, FaultKind, StageError, StageResult, TransportError};
pub use motion::{
    signed_magnitude, ApplyResult, DeviceStatus, LimitDirection, LoopMode, MotionCommand,
    SpeedProfile, Target, Unit,
};
pub use poller::{PollReport, PollSettings, PollState, ReadyPoller};
pub use transport::{
    resolve_port_path, LineChannel, LineTransport, ResourceManager, SerialResourceManager,
    SerialSettings, SerialTransport,
};
