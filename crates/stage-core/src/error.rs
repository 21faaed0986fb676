//! Error types for stage controller sessions.
//!
//! Every fallible operation in the stage stack returns [`StageResult`], whose error type
//! [`StageError`] separates the failure categories a caller has to react to differently:
//!
//! - **`Transport`**: the serial session failed (open, write, read, timeout). The session is
//!   poisoned afterwards and must be closed and reconnected.
//! - **`Validation`** / **`InvalidAxis`**: the request was rejected before anything was written.
//! - **`Decode`**: the controller answered, but the reply did not match the family's grammar.
//! - **`Axis`**: the controller reported a fault for an axis (limit stop, command error, ...).
//! - **`Timeout`**: the ready-poll budget was exhausted while the axis stayed busy.
//! - **`Config`** / **`Configuration`**: configuration parsing or semantic validation failed.
//!
//! Transport failures are kept in their own [`TransportError`] enum so the resource layer can
//! be used without pulling in motion semantics.

use crate::axis::Family;
use crate::motion::LimitDirection;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using [`StageError`].
pub type StageResult<T> = std::result::Result<T, StageError>;

// =============================================================================
// Transport Errors
// =============================================================================

/// Failure of the line-oriented serial session.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Opening the serial port failed (missing device, permission denied, bad settings).
    #[error("Failed to open serial port '{resource}': {source}")]
    Open {
        /// Resource identifier that was being opened.
        resource: String,
        /// Underlying serialport error.
        #[source]
        source: serialport::Error,
    },

    /// A write or read on an open port failed, including read timeouts.
    ///
    /// **Error Type**: Transient at the wire level, but the session state is unknown
    /// afterwards (a reply may still be in flight).
    ///
    /// **Recovery Strategy**: Close the session and reconnect before issuing new commands.
    #[error("I/O error on '{resource}': {source}")]
    Io {
        /// Resource identifier of the session.
        resource: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The port closed while a reply was expected.
    #[error("Connection to '{0}' closed while waiting for a reply")]
    UnexpectedEof(String),

    /// An operation was attempted before `connect` or after `close`.
    #[error("Controller session is not connected")]
    NotConnected,

    /// A previous I/O failure poisoned the session.
    #[error("Session on '{0}' failed earlier; close and reconnect before reuse")]
    Poisoned(String),

    /// The resource identifier names an interface this stack cannot open.
    #[error("Unsupported resource identifier '{0}' (expected ASRL<n>::INSTR or a serial port path)")]
    UnknownResource(String),
}

impl TransportError {
    /// Wrap an I/O error with the resource it occurred on.
    pub fn io(resource: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            resource: resource.into(),
            source,
        }
    }

    /// Whether the error leaves the session unusable until it is reopened.
    pub fn requires_reopen(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::UnexpectedEof(_) | Self::Poisoned(_)
        )
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// A controller reply that does not match the expected grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} (reply: {reply:?})")]
pub struct DecodeError {
    /// Raw reply text with terminators stripped.
    pub reply: String,
    /// What was wrong with it.
    pub reason: String,
}

impl DecodeError {
    /// Create a decode error for `reply`.
    pub fn new(reply: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Axis Faults
// =============================================================================

/// Classification of a fault reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// The axis stopped on a limit sensor (hardware or software).
    Limit(LimitDirection),
    /// Any other controller fault, carrying the family's raw code.
    Code(String),
}

/// A fault condition reported by the controller for one axis.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("OptoSigma {family} axis {axis}: {message}")]
pub struct AxisFault {
    /// Controller family that reported the fault.
    pub family: Family,
    /// 1-based axis channel.
    pub axis: u8,
    /// Fault classification.
    pub kind: FaultKind,
    /// Human-readable message from the family's code table.
    pub message: String,
}

impl AxisFault {
    /// Fault from a raw controller code.
    pub fn code(family: Family, axis: u8, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            family,
            axis,
            kind: FaultKind::Code(code.into()),
            message: message.into(),
        }
    }

    /// Limit-sensor stop.
    pub fn limit(family: Family, axis: u8, direction: LimitDirection) -> Self {
        Self {
            family,
            axis,
            kind: FaultKind::Limit(direction),
            message: format!("stopped at {direction}"),
        }
    }

    /// Whether the axis stopped on a limit sensor.
    pub fn is_limit(&self) -> bool {
        matches!(self.kind, FaultKind::Limit(_))
    }
}

// =============================================================================
// Stage Errors
// =============================================================================

/// Primary error type for stage controller operations.
///
/// # Example
///
/// ```rust
/// use stage_core::{SpeedProfile, StageError};
///
/// let err = SpeedProfile::new(2000, 100, 50).unwrap_err();
/// assert!(matches!(err, StageError::Validation(_)));
/// ```
#[derive(Error, Debug)]
pub enum StageError {
    /// The serial session failed.
    ///
    /// **Recovery Strategy**: `close()` the controller and `connect()` again. Cached axis
    /// state is still the last confirmed state.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A request parameter was rejected before any byte was written.
    ///
    /// Covers speed tuples violating `0 < initial <= final` or `acceleration > 0`, duplicate
    /// axes in a multi-axis move, and similar caller mistakes.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The axis channel or name does not exist on this controller family.
    #[error("Axis '{axis}' is not valid for {family} (channels 1..={max})")]
    InvalidAxis {
        /// Family of the controller.
        family: Family,
        /// Axis as given by the caller.
        axis: String,
        /// Highest valid channel.
        max: u8,
    },

    /// A reply could not be decoded.
    ///
    /// Decode errors never mutate cached axis state.
    #[error("Protocol decode error for '{command}': {source}")]
    Decode {
        /// Command whose reply failed to decode.
        command: String,
        /// Decode failure detail.
        #[source]
        source: DecodeError,
    },

    /// The controller reported a fault for an axis.
    #[error("{0}")]
    Axis(AxisFault),

    /// The axis did not report ready within the poll budget.
    ///
    /// **Error Type**: Not necessarily a failure of the device. Long moves at low speed can
    /// exceed the default 60 s budget; the caller decides whether to keep polling.
    #[error("Axis {axis} did not become ready within {budget:?} ({polls} status polls)")]
    Timeout {
        /// Axis that was polled.
        axis: u8,
        /// Poll budget that was exhausted.
        budget: Duration,
        /// Status queries sent before giving up.
        polls: u32,
    },

    /// Configuration file or environment parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration values parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl StageError {
    /// Decode error for the reply to `command`.
    pub fn decode(command: impl Into<String>, source: DecodeError) -> Self {
        Self::Decode {
            command: command.into(),
            source,
        }
    }

    /// Whether the same request may succeed if simply repeated.
    ///
    /// Only a poll timeout qualifies: the axis may still have been moving. Decode errors,
    /// device faults, validation errors and poisoned sessions are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the session must be closed and reopened before further use.
    pub fn requires_reopen(&self) -> bool {
        match self {
            Self::Transport(err) => err.requires_reopen(),
            _ => false,
        }
    }
}

impl From<AxisFault> for StageError {
    fn from(fault: AxisFault) -> Self {
        Self::Axis(fault)
    }
}
