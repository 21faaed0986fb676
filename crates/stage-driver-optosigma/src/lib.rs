//! OptoSigma stage controller drivers.
//!
//! This crate provides a blocking [`Controller`] for three OptoSigma families sharing one
//! line-oriented ASCII protocol style:
//! - SHRC-203 three-axis controller (9600 baud, multiple units, loop control)
//! - GSC-02 two-axis controller (9600 baud, pulses only)
//! - SBIS26 driver-integrated controller (38400 baud, pulses only, no go command)
//!
//! Family differences live in [`FamilyProtocol`]; the controller owns the session,
//! the per-axis cache and the ready-poll.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stage_core::{Family, MotionController};
//! use stage_driver_optosigma::Controller;
//!
//! let mut controller = Controller::new(Family::Shrc203);
//! controller.connect("ASRL3::INSTR")?;
//! controller.set_speed(500, 5000, 200, 1)?;
//! controller.move_to(10_000, 1)?;
//! let position = controller.query_position(1)?;
//! controller.close();
//! ```
//!
//! Async callers wrap an axis in [`AsyncStage`], which implements
//! [`stage_core::Movable`].

pub mod controller;
pub mod factory;
pub mod gsc;
pub mod movable;
pub mod protocol;
pub mod sbis26;
pub mod shrc203;
pub mod tracker;

pub use controller::Controller;
pub use factory::ControllerFactory;
pub use gsc::Gsc02;
pub use movable::{AsyncStage, SharedController};
pub use protocol::{FamilyProtocol, Protocol, Query};
pub use sbis26::Sbis26;
pub use shrc203::Shrc203;
pub use tracker::{AxisState, AxisTracker};
