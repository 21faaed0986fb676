//! Controller families and axis naming.

use crate::error::{StageError, StageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Supported OptoSigma controller families.
///
/// The serialized names are the ones used in configuration files:
///
/// ```toml
/// family = "shrc203"   # or "gsc02", "sbis26"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// SHRC-203 three-axis controller with unit designation and loop control.
    #[serde(alias = "shrc-203")]
    Shrc203,
    /// GSC-02 two-axis pulse controller.
    #[serde(alias = "gsc-02", alias = "gsc")]
    Gsc02,
    /// SBIS26 three-axis driver-integrated controller.
    Sbis26,
}

impl Family {
    /// Number of axis channels the controller exposes.
    pub const fn axis_count(self) -> u8 {
        match self {
            Family::Shrc203 | Family::Sbis26 => 3,
            Family::Gsc02 => 2,
        }
    }

    /// Catalogue model name.
    pub const fn model(self) -> &'static str {
        match self {
            Family::Shrc203 => "SHRC-203",
            Family::Gsc02 => "GSC-02",
            Family::Sbis26 => "SBIS26",
        }
    }

    /// Default symbolic axis names and their channels.
    pub const fn default_axis_names(self) -> &'static [(&'static str, u8)] {
        match self {
            Family::Shrc203 | Family::Sbis26 => &[("X", 1), ("Y", 2), ("Z", 3)],
            Family::Gsc02 => &[("Axis1", 1), ("Axis2", 2)],
        }
    }

    /// Check that `channel` exists on this family.
    pub fn validate_axis(self, channel: u8) -> StageResult<u8> {
        if (1..=self.axis_count()).contains(&channel) {
            Ok(channel)
        } else {
            Err(StageError::InvalidAxis {
                family: self,
                axis: channel.to_string(),
                max: self.axis_count(),
            })
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model())
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "shrc203" => Ok(Family::Shrc203),
            "gsc02" | "gsc" => Ok(Family::Gsc02),
            "sbis26" => Ok(Family::Sbis26),
            other => Err(format!(
                "unknown controller family '{other}' (expected shrc203, gsc02 or sbis26)"
            )),
        }
    }
}

/// Mapping from symbolic axis names to channels for one controller.
///
/// Lookups are case-insensitive, and a plain channel number is always accepted.
#[derive(Debug, Clone)]
pub struct AxisNames {
    family: Family,
    names: BTreeMap<String, u8>,
}

impl AxisNames {
    /// Family defaults (`X`/`Y`/`Z` or `Axis1`/`Axis2`).
    pub fn defaults(family: Family) -> Self {
        let names = family
            .default_axis_names()
            .iter()
            .map(|(name, channel)| (name.to_ascii_lowercase(), *channel))
            .collect();
        Self { family, names }
    }

    /// Replace the defaults with a configured mapping.
    ///
    /// Every channel must exist on the family.
    pub fn with_overrides(family: Family, overrides: &BTreeMap<String, u8>) -> StageResult<Self> {
        if overrides.is_empty() {
            return Ok(Self::defaults(family));
        }
        let mut names = BTreeMap::new();
        for (name, channel) in overrides {
            family.validate_axis(*channel)?;
            names.insert(name.to_ascii_lowercase(), *channel);
        }
        Ok(Self { family, names })
    }

    /// Resolve a symbolic name or channel number.
    pub fn resolve(&self, axis: &str) -> StageResult<u8> {
        let key = axis.trim();
        if let Ok(channel) = key.parse::<u8>() {
            return self.family.validate_axis(channel).map_err(|_| self.invalid(key));
        }
        self.names
            .get(&key.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| self.invalid(key))
    }

    /// Name configured for `channel`, if any.
    pub fn name_of(&self, channel: u8) -> Option<&str> {
        self.names
            .iter()
            .find(|(_, c)| **c == channel)
            .map(|(name, _)| name.as_str())
    }

    fn invalid(&self, axis: &str) -> StageError {
        StageError::InvalidAxis {
            family: self.family,
            axis: axis.to_string(),
            max: self.family.axis_count(),
        }
    }
}
