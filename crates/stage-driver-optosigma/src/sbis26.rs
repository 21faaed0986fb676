//! OptoSigma SBIS26 driver-integrated three-axis controller.
//!
//! Protocol reference (38400 baud, 8N1, CRLF, pulse units only):
//! - `#CONNECT` - open a host session (sent on connect)
//! - `A:D,{ch},{+|-}{n}` / `M:D,{ch},{+|-}{n}` - absolute / relative move, executed
//!   immediately (there is no go command)
//! - `H:D,{ch}` - mechanical origin return
//! - `L:D,{ch}` - decelerating stop; `LE:A` - emergency stop of all axes
//! - `D:D,{ch},{initial},{final},{accel}` - speed profile
//! - `SRQ:D,{ch}` - `D,{ch},{position},{limit},{state}` (double query)
//!
//! The limit field is `K` (normal), `C` (CW limit), `W` (CCW limit) or `E` (both); the state
//! field is `R` or `B`. The controller echoes the channel; a mismatch means the reply
//! belongs to another request.

use crate::protocol::{field, fields, parse_position, signed, Protocol, Query};
use stage_core::{
    AxisFault, DecodeError, DeviceStatus, Family, FaultKind, LimitDirection, SerialSettings,
    SpeedProfile, Target, Unit,
};

/// SBIS26 limit-field codes and their messages.
pub const LIMIT_CODES: &[(&str, &str)] = &[
    ("C", "Stopped by clockwise limit sensor detected."),
    ("W", "Stopped by counterclockwise limit sensor detected."),
    ("E", "Stopped by both of limit sensor."),
    ("K", "Normal"),
];

const STATUS_SHAPE: &str = "'D,<ch>,<position>,<limit>,<state>'";

/// SBIS26 protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sbis26;

/// Fields of an `SRQ:D,<ch>` reply after the channel echo was checked.
struct StatusReply<'a> {
    position: &'a str,
    limit: &'a str,
    state: &'a str,
}

impl<'a> StatusReply<'a> {
    fn parse(parts: &[&'a str], axis: u8, reply: &str) -> Result<Self, DecodeError> {
        let channel = field(parts, 1, reply, STATUS_SHAPE)?;
        if channel.parse::<u8>().ok() != Some(axis) {
            return Err(DecodeError::new(
                reply,
                format!("reply is for channel '{channel}', expected {axis}"),
            ));
        }
        Ok(Self {
            position: field(parts, 2, reply, STATUS_SHAPE)?,
            limit: field(parts, 3, reply, STATUS_SHAPE)?,
            state: field(parts, 4, reply, STATUS_SHAPE)?,
        })
    }

    /// Limit stop reported in the limit field, `None` for `K`.
    fn limit(&self, reply: &str) -> Result<Option<LimitDirection>, DecodeError> {
        match self.limit {
            "K" => Ok(None),
            "C" => Ok(Some(LimitDirection::Cw)),
            "W" => Ok(Some(LimitDirection::Ccw)),
            "E" => Ok(Some(LimitDirection::Both)),
            other => Err(DecodeError::new(
                reply,
                format!("unknown limit code '{other}'"),
            )),
        }
    }
}

impl Protocol for Sbis26 {
    fn family(&self) -> Family {
        Family::Sbis26
    }

    fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(38400)
    }

    fn handshake(&self) -> &'static [&'static str] {
        &["#CONNECT"]
    }

    fn stage_command(&self, axis: u8, target: Target, _unit: Unit) -> String {
        match target {
            Target::Absolute(v) => format!("A:D,{axis},{}", signed(v)),
            Target::Relative(v) => format!("M:D,{axis},{}", signed(v)),
        }
    }

    fn go_command(&self) -> Option<&'static str> {
        None
    }

    fn home_command(&self, axis: u8) -> String {
        format!("H:D,{axis}")
    }

    fn stop_command(&self, axis: u8) -> String {
        format!("L:D,{axis}")
    }

    fn emergency_stop_command(&self) -> Option<&'static str> {
        Some("LE:A")
    }

    fn speed_command(&self, axis: u8, profile: &SpeedProfile) -> String {
        format!(
            "D:D,{axis},{},{},{}",
            profile.initial(),
            profile.final_speed(),
            profile.acceleration_time()
        )
    }

    fn status_query(&self, axis: u8) -> Query {
        Query::double(format!("SRQ:D,{axis}"))
    }

    fn decode_status(&self, axis: u8, reply: &str) -> Result<DeviceStatus, DecodeError> {
        let parts = fields(reply);
        let status = StatusReply::parse(&parts, axis, reply)?;
        let limit = status.limit(reply)?;
        match (status.state, limit) {
            ("B", _) => Ok(DeviceStatus::Busy),
            ("R", Some(direction)) => Ok(DeviceStatus::LimitStop(direction)),
            ("R", None) => Ok(DeviceStatus::Ready),
            (other, _) => Err(DecodeError::new(reply, format!("unknown state '{other}'"))),
        }
    }

    fn position_query(&self, axis: u8) -> Query {
        self.status_query(axis)
    }

    fn decode_position(&self, axis: u8, reply: &str) -> Result<i64, DecodeError> {
        let parts = fields(reply);
        let status = StatusReply::parse(&parts, axis, reply)?;
        parse_position(status.position, reply)
    }

    fn error_query(&self, axis: u8) -> Query {
        self.status_query(axis)
    }

    fn decode_fault(&self, axis: u8, reply: &str) -> Result<Option<AxisFault>, DecodeError> {
        let parts = fields(reply);
        let status = StatusReply::parse(&parts, axis, reply)?;
        Ok(status.limit(reply)?.map(|direction| AxisFault {
            family: Family::Sbis26,
            axis,
            kind: FaultKind::Limit(direction),
            message: self
                .fault_message(status.limit)
                .unwrap_or_default()
                .to_string(),
        }))
    }

    fn fault_message(&self, code: &str) -> Option<&'static str> {
        let code = code.trim();
        LIMIT_CODES
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(code))
            .map(|(_, message)| *message)
    }

    fn describe_fault(&self, axis: u8, status: &DeviceStatus) -> AxisFault {
        let code = match status {
            DeviceStatus::LimitStop(LimitDirection::Cw) => "C",
            DeviceStatus::LimitStop(LimitDirection::Ccw) => "W",
            DeviceStatus::LimitStop(_) => "E",
            DeviceStatus::Error(code) => code.as_str(),
            DeviceStatus::Ready | DeviceStatus::Busy => "K",
        };
        let kind = match status {
            DeviceStatus::LimitStop(direction) => FaultKind::Limit(*direction),
            _ => FaultKind::Code(code.to_string()),
        };
        AxisFault {
            family: Family::Sbis26,
            axis,
            kind,
            message: self.fault_message(code).unwrap_or("Unknown error").to_string(),
        }
    }
}
