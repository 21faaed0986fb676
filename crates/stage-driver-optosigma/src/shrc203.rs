//! OptoSigma SHRC-203 three-axis controller.
//!
//! Protocol reference (host mode, 9600 baud, 8N1, CRLF):
//! - `MODE:HOST` - switch the controller to host command mode (sent on connect)
//! - `A:{ch}{+|-}{unit}{n}` / `M:{ch}{+|-}{unit}{n}` - stage absolute / relative move
//! - `G:` - start staged moves
//! - `H:{ch}` - mechanical origin return
//! - `L:{ch}` - decelerating stop
//! - `D:{ch},{initial},{final},{accel}` - speed profile
//! - `!:{ch}S` - status: `R`, `B`, or a status code (see [`STATUS_CODES`])
//! - `Q:S{ch}` - position, field 1 of a comma-delimited reply (double query)
//! - `?:D{ch}` - speed readback `S{initial}F{final}R{accel}` (double query)
//! - `F:{ch}{1|0}` / `?:F{ch}` - open (1) or closed (0) loop
//! - `SRQ:{ch}S` - error check, field 0 is a status code
//!
//! Units are designated per move with a single letter: `N`, `U`, `M`, `D` or `P`.

use crate::protocol::{field, fields, parse_position, Protocol, Query};
use stage_core::{
    AxisFault, DecodeError, DeviceStatus, Family, FaultKind, LimitDirection, LoopMode,
    SpeedProfile, Target, Unit,
};

/// SHRC-203 status codes and their messages.
pub const STATUS_CODES: &[(&str, &str)] = &[
    ("1", "Normal (S1 to S10 and emergency stop has not occurred)"),
    ("3", "Command error"),
    ("7", "Scale error (S1)"),
    ("F", "Disconnection error (S2)"),
    ("1F", "Overflow error (S4)"),
    ("3F", "Emergency stop"),
    ("7F", "Hunting error (S3)"),
    ("FF", "Limit error (S5)"),
    ("1FF", "Counter overflow (S6)"),
    ("3FF", "Auto config error"),
    ("7FF", "24V IO overload warning (W1)"),
    ("FFF", "24V terminal block overload warning (W2)"),
    ("1FFF", "System error (S7)"),
    ("3FFF", "Motor driver overheat warning (W3)"),
    ("7FFF", "Motor driver overheat error (S10)"),
    ("FFFF", "Out of in-position range (after positioning is completed) (READY)"),
    ("1FFFF", "Out of in-position range (during positioning operation) (BUSY)"),
    ("3FFFF", "Logical origin return is in progress"),
    ("7FFFF", "Mechanical origin return is in progress"),
    ("FFFFF", "CW limit detection"),
    ("1FFFFF", "CCW limit detection"),
    ("3FFFFF", "CW software limit stop"),
    ("7FFFFF", "CCW software limit stop"),
    ("FFFFFF", "NEAR sensor detection"),
    ("1FFFFFF", "ORG sensor detection"),
];

/// Look up the message of an SHRC-203 status code.
pub fn status_message(code: &str) -> Option<&'static str> {
    let code = code.trim().to_ascii_uppercase();
    STATUS_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, message)| *message)
}

/// Classify a status code; `None` for codes outside the table.
fn classify(code: &str) -> Option<DeviceStatus> {
    let code = code.trim().to_ascii_uppercase();
    let status = match code.as_str() {
        "1" | "FFFF" => DeviceStatus::Ready,
        "FFFFF" | "3FFFFF" => DeviceStatus::LimitStop(LimitDirection::Cw),
        "1FFFFF" | "7FFFFF" => DeviceStatus::LimitStop(LimitDirection::Ccw),
        "1FFFF" | "3FFFF" | "7FFFF" => DeviceStatus::Busy,
        other => {
            status_message(other)?;
            DeviceStatus::Error(other.to_string())
        }
    };
    Some(status)
}

/// A normal error-check reply starts with the unit letter and the channel (`U1,K,K,K,R`).
fn is_normal_echo(code: &str, axis: u8) -> bool {
    let mut chars = code.chars();
    matches!(chars.next(), Some('P' | 'N' | 'U' | 'M' | 'D'))
        && chars.as_str().parse::<u8>().ok() == Some(axis)
}

/// SHRC-203 protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Shrc203;

impl Protocol for Shrc203 {
    fn family(&self) -> Family {
        Family::Shrc203
    }

    fn handshake(&self) -> &'static [&'static str] {
        &["MODE:HOST"]
    }

    fn stage_command(&self, axis: u8, target: Target, unit: Unit) -> String {
        let (op, value) = match target {
            Target::Absolute(v) => ('A', v),
            Target::Relative(v) => ('M', v),
        };
        let (sign, magnitude) = stage_core::signed_magnitude(value);
        format!("{op}:{axis}{sign}{}{magnitude}", unit.letter())
    }

    fn home_command(&self, axis: u8) -> String {
        format!("H:{axis}")
    }

    fn stop_command(&self, axis: u8) -> String {
        format!("L:{axis}")
    }

    fn speed_command(&self, axis: u8, profile: &SpeedProfile) -> String {
        format!(
            "D:{axis},{},{},{}",
            profile.initial(),
            profile.final_speed(),
            profile.acceleration_time()
        )
    }

    fn status_query(&self, axis: u8) -> Query {
        Query::single(format!("!:{axis}S"))
    }

    fn decode_status(&self, _axis: u8, reply: &str) -> Result<DeviceStatus, DecodeError> {
        match reply.trim() {
            "R" => Ok(DeviceStatus::Ready),
            "B" => Ok(DeviceStatus::Busy),
            code => classify(code)
                .ok_or_else(|| DecodeError::new(reply, "unknown SHRC-203 status code")),
        }
    }

    fn position_query(&self, axis: u8) -> Query {
        Query::double(format!("Q:S{axis}"))
    }

    fn decode_position(&self, _axis: u8, reply: &str) -> Result<i64, DecodeError> {
        let parts = fields(reply);
        let position = field(&parts, 1, reply, "'<axis>,<position>,...'")?;
        parse_position(position, reply)
    }

    fn error_query(&self, axis: u8) -> Query {
        Query::single(format!("SRQ:{axis}S"))
    }

    fn decode_fault(&self, axis: u8, reply: &str) -> Result<Option<AxisFault>, DecodeError> {
        let parts = fields(reply);
        let code = field(&parts, 0, reply, "a status code")?.to_ascii_uppercase();
        if is_normal_echo(&code, axis) {
            return Ok(None);
        }
        let status =
            classify(&code).ok_or_else(|| DecodeError::new(reply, "unknown SHRC-203 status code"))?;
        let message = status_message(&code).unwrap_or("Unknown error");

        Ok(match status {
            DeviceStatus::Ready | DeviceStatus::Busy => None,
            DeviceStatus::LimitStop(direction) => Some(AxisFault {
                family: Family::Shrc203,
                axis,
                kind: FaultKind::Limit(direction),
                message: message.to_string(),
            }),
            DeviceStatus::Error(_) => {
                Some(AxisFault::code(Family::Shrc203, axis, code.clone(), message))
            }
        })
    }

    fn fault_message(&self, code: &str) -> Option<&'static str> {
        status_message(code)
    }

    fn supports_unit(&self, _unit: Unit) -> bool {
        true
    }

    fn loop_command(&self, axis: u8, mode: LoopMode) -> Option<String> {
        let code = match mode {
            LoopMode::Open => 1,
            LoopMode::Closed => 0,
        };
        Some(format!("F:{axis}{code}"))
    }

    fn loop_query(&self, axis: u8) -> Option<Query> {
        Some(Query::single(format!("?:F{axis}")))
    }

    fn decode_loop(&self, reply: &str) -> Result<LoopMode, DecodeError> {
        match reply.trim() {
            "1" => Ok(LoopMode::Open),
            "0" => Ok(LoopMode::Closed),
            _ => Err(DecodeError::new(reply, "expected loop mode 1 (open) or 0 (closed)")),
        }
    }

    fn speed_query(&self, axis: u8) -> Option<Query> {
        Some(Query::double(format!("?:D{axis}")))
    }

    fn decode_speed(&self, reply: &str) -> Result<SpeedProfile, DecodeError> {
        let shape = || DecodeError::new(reply, "expected 'S<initial>F<final>R<accel>'");
        let body = reply.trim().strip_prefix('S').ok_or_else(shape)?;
        let (initial, rest) = body.split_once('F').ok_or_else(shape)?;
        let (final_speed, accel) = rest.split_once('R').ok_or_else(shape)?;

        let number = |s: &str| s.trim().parse::<u32>().map_err(|_| shape());
        SpeedProfile::new(number(initial)?, number(final_speed)?, number(accel)?)
            .map_err(|e| DecodeError::new(reply, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_commands_carry_sign_and_unit() {
        let p = Shrc203;
        assert_eq!(p.stage_command(1, Target::Absolute(1000), Unit::Pulse), "A:1+P1000");
        assert_eq!(p.stage_command(2, Target::Absolute(0), Unit::Micrometer), "A:2+U0");
        assert_eq!(p.stage_command(3, Target::Relative(-250), Unit::Millimeter), "M:3-M250");
        assert_eq!(p.stage_command(1, Target::Relative(5), Unit::Degree), "M:1+D5");
        assert_eq!(p.go_command(), Some("G:"));
    }

    #[test]
    fn speed_and_motion_lines() {
        let p = Shrc203;
        let profile = SpeedProfile::new(100, 2000, 50).unwrap();
        assert_eq!(p.speed_command(2, &profile), "D:2,100,2000,50");
        assert_eq!(p.home_command(3), "H:3");
        assert_eq!(p.stop_command(1), "L:1");
        assert_eq!(p.handshake(), &["MODE:HOST"]);
    }

    #[test]
    fn status_replies_decode() {
        let p = Shrc203;
        assert_eq!(p.decode_status(1, "R").unwrap(), DeviceStatus::Ready);
        assert_eq!(p.decode_status(1, " B ").unwrap(), DeviceStatus::Busy);
        assert_eq!(p.decode_status(1, "1").unwrap(), DeviceStatus::Ready);
        assert_eq!(
            p.decode_status(1, "FFFFF").unwrap(),
            DeviceStatus::LimitStop(LimitDirection::Cw)
        );
        assert_eq!(
            p.decode_status(1, "7fffff").unwrap(),
            DeviceStatus::LimitStop(LimitDirection::Ccw)
        );
        assert_eq!(p.decode_status(1, "7FFFF").unwrap(), DeviceStatus::Busy);
        assert_eq!(p.decode_status(1, "FFFF").unwrap(), DeviceStatus::Ready);
        assert_eq!(p.decode_status(1, "1FFFF").unwrap(), DeviceStatus::Busy);
        assert_eq!(p.decode_status(1, "3").unwrap(), DeviceStatus::Error("3".into()));
        assert!(p.decode_status(1, "Z").is_err());
        assert!(p.decode_status(1, "").is_err());
    }

    #[test]
    fn every_table_code_classifies() {
        for (code, _) in STATUS_CODES {
            assert!(classify(code).is_some(), "{code}");
        }
        assert_eq!(STATUS_CODES.len(), 25);
        assert_eq!(
            status_message("FFFF"),
            Some("Out of in-position range (after positioning is completed) (READY)")
        );
        assert_eq!(
            status_message("1FFFF"),
            Some("Out of in-position range (during positioning operation) (BUSY)")
        );
    }

    #[test]
    fn fault_messages_come_from_the_table() {
        let p = Shrc203;
        let fault = p.describe_fault(2, &DeviceStatus::Error("1FFF".into()));
        assert_eq!(fault.message, "System error (S7)");
        assert_eq!(fault.kind, FaultKind::Code("1FFF".into()));
        assert_eq!(
            fault.to_string(),
            "OptoSigma SHRC-203 axis 2: System error (S7)"
        );
    }

    #[test]
    fn error_check_replies() {
        let p = Shrc203;
        assert_eq!(p.decode_fault(1, "U1,K,K,K,R").unwrap(), None);
        assert_eq!(p.decode_fault(2, "P2,K,K,K,R").unwrap(), None);
        assert_eq!(p.decode_fault(3, "d3,K,K,K,R").unwrap(), None);
        assert!(p.decode_fault(1, "U2,K,K,K,R").is_err());

        assert_eq!(p.decode_fault(2, "7FFFF").unwrap(), None);
        assert_eq!(p.decode_fault(1, "1FFFF,K").unwrap(), None);

        let fault = p.decode_fault(1, "3").unwrap().unwrap();
        assert_eq!(fault.message, "Command error");

        let limit = p.decode_fault(3, "1FFFFF,K").unwrap().unwrap();
        assert!(limit.is_limit());
        assert_eq!(limit.message, "CCW limit detection");

        assert!(p.decode_fault(1, "QQ").is_err());
    }

    #[test]
    fn position_reply_uses_field_one() {
        let p = Shrc203;
        assert_eq!(p.position_query(2), Query::double("Q:S2"));
        assert_eq!(p.decode_position(2, "2,+1000").unwrap(), 1000);
        assert_eq!(p.decode_position(2, "2,-  35,K").unwrap(), -35);
        assert!(p.decode_position(2, "2").is_err());
    }

    #[test]
    fn speed_readback() {
        let p = Shrc203;
        let profile = p.decode_speed("S100F2000R50").unwrap();
        assert_eq!(
            (profile.initial(), profile.final_speed(), profile.acceleration_time()),
            (100, 2000, 50)
        );
        assert!(p.decode_speed("100,2000,50").is_err());
        assert!(p.decode_speed("S0F10R1").is_err());
    }

    #[test]
    fn loop_mode_encoding() {
        let p = Shrc203;
        assert_eq!(p.loop_command(1, LoopMode::Open).unwrap(), "F:11");
        assert_eq!(p.loop_command(2, LoopMode::Closed).unwrap(), "F:20");
        assert_eq!(p.decode_loop("0").unwrap(), LoopMode::Closed);
        assert!(p.decode_loop("2").is_err());
    }
}
