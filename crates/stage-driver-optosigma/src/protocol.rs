//! Per-family command encoding and reply decoding.
//!
//! Each controller family implements [`Protocol`]: pure functions from semantic
//! operations to wire lines and from reply lines to typed values. No I/O happens here;
//! the [`Controller`](crate::Controller) owns the session and calls into the protocol.
//!
//! [`FamilyProtocol`] selects the implementation at runtime with `enum_dispatch`, so the
//! controller is a single concrete type for all families.

use crate::gsc::Gsc02;
use crate::sbis26::Sbis26;
use crate::shrc203::Shrc203;
use enum_dispatch::enum_dispatch;
use stage_core::{
    AxisFault, DecodeError, DeviceStatus, Family, LoopMode, SerialSettings, SpeedProfile, Target,
    Unit,
};

/// A status or position query as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Command line.
    pub command: String,
    /// The controller only answers authoritatively to the second of two identical
    /// queries; the first reply must be discarded.
    pub repeat: bool,
}

impl Query {
    /// Query answered by its first reply.
    pub fn single(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            repeat: false,
        }
    }

    /// Query that must be sent twice.
    pub fn double(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            repeat: true,
        }
    }
}

/// Wire protocol of one controller family.
///
/// Axis arguments are 1-based channels already validated by the caller.
#[enum_dispatch]
pub trait Protocol {
    /// Family implemented by this protocol.
    fn family(&self) -> Family;

    /// Fixed serial settings of the family.
    fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(9600)
    }

    /// Lines written once after the port is opened.
    fn handshake(&self) -> &'static [&'static str] {
        &[]
    }

    /// Line staging (or, without a go command, starting) a move.
    fn stage_command(&self, axis: u8, target: Target, unit: Unit) -> String;

    /// Line starting all staged moves, if the family separates staging from execution.
    fn go_command(&self) -> Option<&'static str> {
        Some("G:")
    }

    /// Return-to-origin line.
    fn home_command(&self, axis: u8) -> String;

    /// Decelerating stop line.
    fn stop_command(&self, axis: u8) -> String;

    /// Single line stopping every axis, if the family has one.
    fn emergency_stop_command(&self) -> Option<&'static str> {
        None
    }

    /// Speed-profile line.
    fn speed_command(&self, axis: u8, profile: &SpeedProfile) -> String;

    /// Status query for `axis`.
    fn status_query(&self, axis: u8) -> Query;

    /// Decode a status reply.
    fn decode_status(&self, axis: u8, reply: &str) -> Result<DeviceStatus, DecodeError>;

    /// Position query for `axis`.
    fn position_query(&self, axis: u8) -> Query;

    /// Decode a position reply.
    fn decode_position(&self, axis: u8, reply: &str) -> Result<i64, DecodeError>;

    /// Error-check query for `axis`.
    fn error_query(&self, axis: u8) -> Query;

    /// Decode an error-check reply; `None` means no fault is pending.
    fn decode_fault(&self, axis: u8, reply: &str) -> Result<Option<AxisFault>, DecodeError>;

    /// Message for a raw fault code from the family's code table.
    fn fault_message(&self, code: &str) -> Option<&'static str>;

    /// Turn a fault status into an [`AxisFault`].
    fn describe_fault(&self, axis: u8, status: &DeviceStatus) -> AxisFault {
        let family = self.family();
        match status {
            DeviceStatus::LimitStop(direction) => AxisFault::limit(family, axis, *direction),
            DeviceStatus::Error(code) => AxisFault::code(
                family,
                axis,
                code.clone(),
                self.fault_message(code).unwrap_or("Unknown error"),
            ),
            DeviceStatus::Ready | DeviceStatus::Busy => {
                AxisFault::code(family, axis, "", "no fault reported")
            }
        }
    }

    /// Whether positions of this family can be expressed in `unit`.
    fn supports_unit(&self, unit: Unit) -> bool {
        unit == Unit::Pulse
    }

    /// Loop-mode line, if the family has loop control.
    fn loop_command(&self, _axis: u8, _mode: LoopMode) -> Option<String> {
        None
    }

    /// Loop-mode query, if the family has loop control.
    fn loop_query(&self, _axis: u8) -> Option<Query> {
        None
    }

    /// Decode a loop-mode reply.
    fn decode_loop(&self, reply: &str) -> Result<LoopMode, DecodeError> {
        Err(DecodeError::new(reply, "loop mode is not supported"))
    }

    /// Speed-profile query, if the family can report it.
    fn speed_query(&self, _axis: u8) -> Option<Query> {
        None
    }

    /// Decode a speed-profile reply.
    fn decode_speed(&self, reply: &str) -> Result<SpeedProfile, DecodeError> {
        Err(DecodeError::new(reply, "speed readback is not supported"))
    }
}

/// Protocol of any supported family.
#[enum_dispatch(Protocol)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyProtocol {
    /// SHRC-203
    Shrc203,
    /// GSC-02
    Gsc02,
    /// SBIS26
    Sbis26,
}

impl From<Family> for FamilyProtocol {
    fn from(family: Family) -> Self {
        match family {
            Family::Shrc203 => Shrc203.into(),
            Family::Gsc02 => Gsc02.into(),
            Family::Sbis26 => Sbis26.into(),
        }
    }
}

/// Split a comma-delimited reply into trimmed fields.
pub(crate) fn fields(reply: &str) -> Vec<&str> {
    reply.split(',').map(str::trim).collect()
}

/// Field `index` of `fields`, or a decode error naming the expected shape.
pub(crate) fn field<'a>(
    fields: &[&'a str],
    index: usize,
    reply: &str,
    shape: &str,
) -> Result<&'a str, DecodeError> {
    fields.get(index).copied().ok_or_else(|| {
        DecodeError::new(
            reply,
            format!("expected {shape}, found {} field(s)", fields.len()),
        )
    })
}

/// Parse a signed position field; blanks between sign and digits are ignored.
pub(crate) fn parse_position(field: &str, reply: &str) -> Result<i64, DecodeError> {
    let compact: String = field.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .parse::<i64>()
        .map_err(|_| DecodeError::new(reply, format!("'{field}' is not a position")))
}

/// Encode a move target as `<sign><magnitude>`.
pub(crate) fn signed(value: i64) -> String {
    let (sign, magnitude) = stage_core::signed_magnitude(value);
    format!("{sign}{magnitude}")
}
