//! Motion vocabulary shared by all controller families.
//!
//! Positions and deltas are signed integers in the axis' current unit (pulses unless a
//! unit was designated with `set_unit`). Speed values are unsigned integers as sent on
//! the wire.

use crate::error::{StageError, StageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit designation for position values on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Unit {
    /// Motor pulses (supported by every family).
    #[default]
    #[serde(rename = "pulse")]
    Pulse,
    /// Nanometres.
    #[serde(rename = "nm")]
    Nanometer,
    /// Micrometres.
    #[serde(rename = "um")]
    Micrometer,
    /// Millimetres.
    #[serde(rename = "mm")]
    Millimeter,
    /// Degrees (rotation stages).
    #[serde(rename = "deg")]
    Degree,
}

impl Unit {
    /// Single-letter unit designator used in SHRC move commands.
    pub const fn letter(self) -> char {
        match self {
            Unit::Pulse => 'P',
            Unit::Nanometer => 'N',
            Unit::Micrometer => 'U',
            Unit::Millimeter => 'M',
            Unit::Degree => 'D',
        }
    }

    /// Short name as used in configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Unit::Pulse => "pulse",
            Unit::Nanometer => "nm",
            Unit::Micrometer => "um",
            Unit::Millimeter => "mm",
            Unit::Degree => "deg",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pulse" | "p" => Ok(Unit::Pulse),
            "nm" | "n" => Ok(Unit::Nanometer),
            "um" | "u" => Ok(Unit::Micrometer),
            "mm" | "m" => Ok(Unit::Millimeter),
            "deg" | "d" => Ok(Unit::Degree),
            other => Err(format!("unknown unit '{other}' (expected pulse, nm, um, mm or deg)")),
        }
    }
}

/// Position feedback mode of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Open loop (no encoder feedback).
    Open,
    /// Closed loop (encoder feedback).
    Closed,
}

/// Speed profile of an axis: start speed, top speed and acceleration time.
///
/// Construction enforces `0 < initial <= final` and `acceleration_time > 0`, so a profile
/// that exists is always valid to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpeedProfile {
    initial: u32,
    #[serde(rename = "final")]
    final_speed: u32,
    acceleration_time: u32,
}

impl SpeedProfile {
    /// Validate and build a speed profile.
    pub fn new(initial: u32, final_speed: u32, acceleration_time: u32) -> StageResult<Self> {
        if initial == 0 {
            return Err(StageError::Validation(
                "initial speed must be greater than zero".into(),
            ));
        }
        if initial > final_speed {
            return Err(StageError::Validation(format!(
                "initial speed {initial} exceeds final speed {final_speed}"
            )));
        }
        if acceleration_time == 0 {
            return Err(StageError::Validation(
                "acceleration time must be greater than zero".into(),
            ));
        }
        Ok(Self {
            initial,
            final_speed,
            acceleration_time,
        })
    }

    /// Start speed.
    pub fn initial(&self) -> u32 {
        self.initial
    }

    /// Top speed.
    pub fn final_speed(&self) -> u32 {
        self.final_speed
    }

    /// Acceleration/deceleration time.
    pub fn acceleration_time(&self) -> u32 {
        self.acceleration_time
    }
}

impl fmt::Display for SpeedProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "initial={} final={} accel={}",
            self.initial, self.final_speed, self.acceleration_time
        )
    }
}

/// Direction of a limit-sensor stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitDirection {
    /// Clockwise (positive) limit.
    Cw,
    /// Counter-clockwise (negative) limit.
    Ccw,
    /// Both limit sensors active.
    Both,
    /// The controller does not report which side.
    Unspecified,
}

impl fmt::Display for LimitDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LimitDirection::Cw => "CW limit",
            LimitDirection::Ccw => "CCW limit",
            LimitDirection::Both => "both limits",
            LimitDirection::Unspecified => "limit sensor",
        })
    }
}

/// Decoded state of one axis as reported by a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Motion finished; the axis accepts new commands.
    Ready,
    /// Motion in progress.
    Busy,
    /// Motion stopped on a limit sensor.
    LimitStop(LimitDirection),
    /// The controller reported a fault code.
    Error(String),
}

impl DeviceStatus {
    /// Whether this status terminates a ready-poll with a device fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, DeviceStatus::LimitStop(_) | DeviceStatus::Error(_))
    }
}

/// Target of a single-axis motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Move to an absolute position.
    Absolute(i64),
    /// Move by a signed delta from the current position.
    Relative(i64),
}

impl Target {
    /// Signed value carried by the target.
    pub fn value(self) -> i64 {
        match self {
            Target::Absolute(v) | Target::Relative(v) => v,
        }
    }
}

/// One staged motion: axis, target and an optional speed override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionCommand {
    /// 1-based axis channel.
    pub axis: u8,
    /// Absolute or relative target.
    pub target: Target,
    /// Speed profile applied to the axis before the move is staged.
    pub speed: Option<SpeedProfile>,
}

impl MotionCommand {
    /// Absolute move of `axis` to `position`.
    pub fn absolute(axis: u8, position: i64) -> Self {
        Self {
            axis,
            target: Target::Absolute(position),
            speed: None,
        }
    }

    /// Relative move of `axis` by `delta`.
    pub fn relative(axis: u8, delta: i64) -> Self {
        Self {
            axis,
            target: Target::Relative(delta),
            speed: None,
        }
    }

    /// Attach a speed override.
    pub fn with_speed(mut self, profile: SpeedProfile) -> Self {
        self.speed = Some(profile);
        self
    }
}

/// Outcome of a parameter change that not every family supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// The parameter was applied.
    Applied,
    /// The family has no such parameter; nothing was written.
    Unsupported(&'static str),
}

/// Split a signed value into the wire sign character and magnitude.
///
/// Zero and positive values use `+`.
pub fn signed_magnitude(value: i64) -> (char, u64) {
    if value >= 0 {
        ('+', value.unsigned_abs())
    } else {
        ('-', value.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_encoded_with_plus_sign() {
        assert_eq!(signed_magnitude(0), ('+', 0));
        assert_eq!(signed_magnitude(1500), ('+', 1500));
        assert_eq!(signed_magnitude(-20), ('-', 20));
        assert_eq!(signed_magnitude(i64::MIN), ('-', 9_223_372_036_854_775_808));
    }

    #[test]
    fn speed_profile_validation() {
        assert!(SpeedProfile::new(100, 2000, 50).is_ok());
        assert!(SpeedProfile::new(500, 500, 1).is_ok());

        for (initial, final_speed, accel) in [(0, 100, 10), (200, 100, 10), (100, 200, 0)] {
            let err = SpeedProfile::new(initial, final_speed, accel).unwrap_err();
            assert!(matches!(err, StageError::Validation(_)), "{err}");
        }
    }

    #[test]
    fn unit_letters_and_names() {
        assert_eq!(Unit::Micrometer.letter(), 'U');
        assert_eq!(Unit::Degree.letter(), 'D');
        assert_eq!("UM".parse::<Unit>().unwrap(), Unit::Micrometer);
        assert_eq!("pulse".parse::<Unit>().unwrap(), Unit::Pulse);
        assert!("inch".parse::<Unit>().is_err());
        assert_eq!(Unit::default(), Unit::Pulse);
    }

    #[test]
    fn fault_statuses() {
        assert!(!DeviceStatus::Ready.is_fault());
        assert!(!DeviceStatus::Busy.is_fault());
        assert!(DeviceStatus::LimitStop(LimitDirection::Ccw).is_fault());
        assert!(DeviceStatus::Error("3".into()).is_fault());
    }
}
