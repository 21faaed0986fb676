//! OptoSigma GSC-02 two-axis controller.
//!
//! Protocol reference (9600 baud, 8N1, CRLF, pulse units only):
//! - `A:{ch}{+|-}P{n}` / `M:{ch}{+|-}P{n}` - stage absolute / relative move
//! - `G:` - start staged moves
//! - `H:{ch}` - mechanical origin return
//! - `L:{ch}` - decelerating stop
//! - `D:{ch}S{initial}F{final}R{accel}` - speed profile
//! - `Q:` - `{pos1},{pos2},{ACK1},{ACK2},{ACK3}` for both axes at once
//!
//! ACK1 is `K` (normal) or `X` (command/parameter error). ACK2 is `K` (normal), `L` (axis 1
//! stopped at a limit sensor), `M` (axis 2) or `W` (both). ACK3 is `R` (ready) or `B`
//! (busy). Position fields are space-padded between sign and digits.

use crate::protocol::{field, fields, parse_position, Protocol, Query};
use stage_core::{
    signed_magnitude, AxisFault, DecodeError, DeviceStatus, Family, FaultKind, LimitDirection,
    SpeedProfile, Target, Unit,
};

/// GSC-02 acknowledgement codes and their messages.
pub const ACK_CODES: &[(&str, &str)] = &[
    ("X", "Command or parameter errors"),
    ("K", "Normal state"),
    ("L", "First-axis stopped at LS"),
    ("M", "Second-axis stopped at LS"),
    ("W", "First and second axes stopped at LS"),
];

const STATUS_SHAPE: &str = "'<pos1>,<pos2>,<ACK1>,<ACK2>,<ACK3>'";

/// GSC-02 protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gsc02;

/// Decoded `Q:` reply.
struct StatusReply<'a> {
    ack1: &'a str,
    ack2: &'a str,
    ack3: &'a str,
}

impl<'a> StatusReply<'a> {
    fn parse(parts: &[&'a str], reply: &str) -> Result<Self, DecodeError> {
        Ok(Self {
            ack1: field(parts, 2, reply, STATUS_SHAPE)?,
            ack2: field(parts, 3, reply, STATUS_SHAPE)?,
            ack3: field(parts, 4, reply, STATUS_SHAPE)?,
        })
    }

    /// Whether ACK2 reports a limit stop on `axis`.
    fn limit_on(&self, axis: u8, reply: &str) -> Result<bool, DecodeError> {
        match self.ack2 {
            "K" => Ok(false),
            "L" => Ok(axis == 1),
            "M" => Ok(axis == 2),
            "W" => Ok(true),
            other => Err(DecodeError::new(reply, format!("unknown ACK2 code '{other}'"))),
        }
    }

    /// The GSC-02 does not report which sensor tripped.
    fn limit_direction(&self) -> LimitDirection {
        if self.ack2 == "W" {
            LimitDirection::Both
        } else {
            LimitDirection::Unspecified
        }
    }

    fn command_error(&self, reply: &str) -> Result<bool, DecodeError> {
        match self.ack1 {
            "K" => Ok(false),
            "X" => Ok(true),
            other => Err(DecodeError::new(reply, format!("unknown ACK1 code '{other}'"))),
        }
    }
}

impl Protocol for Gsc02 {
    fn family(&self) -> Family {
        Family::Gsc02
    }

    fn stage_command(&self, axis: u8, target: Target, _unit: Unit) -> String {
        match target {
            Target::Absolute(v) => format!("A:{axis}{}", pulses(v)),
            Target::Relative(v) => format!("M:{axis}{}", pulses(v)),
        }
    }

    fn home_command(&self, axis: u8) -> String {
        format!("H:{axis}")
    }

    fn stop_command(&self, axis: u8) -> String {
        format!("L:{axis}")
    }

    fn speed_command(&self, axis: u8, profile: &SpeedProfile) -> String {
        format!(
            "D:{axis}S{}F{}R{}",
            profile.initial(),
            profile.final_speed(),
            profile.acceleration_time()
        )
    }

    fn status_query(&self, _axis: u8) -> Query {
        Query::single("Q:")
    }

    fn decode_status(&self, axis: u8, reply: &str) -> Result<DeviceStatus, DecodeError> {
        let parts = fields(reply);
        let status = StatusReply::parse(&parts, reply)?;

        if status.command_error(reply)? {
            return Ok(DeviceStatus::Error("X".to_string()));
        }
        // The limit flag stays set while the stage drives off the switch.
        let limit = status.limit_on(axis, reply)?;
        match status.ack3 {
            "B" => Ok(DeviceStatus::Busy),
            "R" if limit => Ok(DeviceStatus::LimitStop(status.limit_direction())),
            "R" => Ok(DeviceStatus::Ready),
            other => Err(DecodeError::new(reply, format!("unknown ACK3 code '{other}'"))),
        }
    }

    fn position_query(&self, _axis: u8) -> Query {
        Query::single("Q:")
    }

    fn decode_position(&self, axis: u8, reply: &str) -> Result<i64, DecodeError> {
        let parts = fields(reply);
        let index = usize::from(axis.saturating_sub(1));
        parse_position(field(&parts, index, reply, STATUS_SHAPE)?, reply)
    }

    fn error_query(&self, _axis: u8) -> Query {
        Query::single("Q:")
    }

    fn decode_fault(&self, axis: u8, reply: &str) -> Result<Option<AxisFault>, DecodeError> {
        let parts = fields(reply);
        let status = StatusReply::parse(&parts, reply)?;

        if status.command_error(reply)? {
            return Ok(Some(AxisFault::code(
                Family::Gsc02,
                axis,
                "X",
                self.fault_message("X").unwrap_or_default(),
            )));
        }
        if status.limit_on(axis, reply)? {
            return Ok(Some(AxisFault {
                family: Family::Gsc02,
                axis,
                kind: FaultKind::Limit(status.limit_direction()),
                message: self.fault_message(status.ack2).unwrap_or_default().to_string(),
            }));
        }
        Ok(None)
    }

    fn fault_message(&self, code: &str) -> Option<&'static str> {
        let code = code.trim();
        ACK_CODES
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(code))
            .map(|(_, message)| *message)
    }
}

fn pulses(value: i64) -> String {
    let (sign, magnitude) = signed_magnitude(value);
    format!("{sign}P{magnitude}")
}
