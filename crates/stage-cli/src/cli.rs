//! Command-line arguments and command execution for `stagectl`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::providers::Serialized;
use serde::Serialize;
use stage_core::{ControllerConfig, Family, MotionCommand, MotionController, SpeedProfile};
use stage_driver_optosigma::Controller;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stagectl")]
#[command(about = "Control OptoSigma SHRC-203, GSC-02 and SBIS26 stage controllers", long_about = None)]
pub struct Cli {
    /// Controller configuration file (TOML); STAGECTL_* environment variables override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Controller family (shrc203, gsc02, sbis26)
    #[arg(long, global = true)]
    pub family: Option<Family>,

    /// Resource identifier (ASRL3::INSTR, /dev/ttyUSB0, COM3)
    #[arg(long, global = true)]
    pub resource: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Move an axis to an absolute position
    Move {
        /// Target position in the axis unit
        #[arg(allow_hyphen_values = true)]
        position: i64,
        /// Axis name or channel
        #[arg(short, long, default_value = "1")]
        axis: String,
        /// Speed profile applied before the move: INITIAL,FINAL,ACCEL
        #[arg(long, value_parser = parse_speed)]
        speed: Option<SpeedProfile>,
    },

    /// Move an axis by a relative distance
    MoveRel {
        /// Distance in the axis unit
        #[arg(allow_hyphen_values = true)]
        delta: i64,
        /// Axis name or channel
        #[arg(short, long, default_value = "1")]
        axis: String,
        /// Speed profile applied before the move: INITIAL,FINAL,ACCEL
        #[arg(long, value_parser = parse_speed)]
        speed: Option<SpeedProfile>,
    },

    /// Return an axis to its mechanical origin
    Home {
        /// Axis name or channel
        #[arg(short, long, default_value = "1")]
        axis: String,
    },

    /// Stop an axis, or every axis with --all
    Stop {
        /// Axis name or channel
        #[arg(short, long, default_value = "1", conflicts_with = "all")]
        axis: String,
        /// Emergency stop of all axes
        #[arg(long)]
        all: bool,
    },

    /// Set the speed profile of an axis
    Speed {
        /// Initial speed
        initial: u32,
        /// Final speed
        final_speed: u32,
        /// Acceleration time
        acceleration_time: u32,
        /// Axis name or channel
        #[arg(short, long, default_value = "1")]
        axis: String,
    },

    /// Read the position of an axis from the controller
    Position {
        /// Axis name or channel
        #[arg(short, long, default_value = "1")]
        axis: String,
    },

    /// Wait until an axis reports ready
    Status {
        /// Axis name or channel
        #[arg(short, long, default_value = "1")]
        axis: String,
    },

    /// Query the pending fault of an axis
    Check {
        /// Axis name or channel
        #[arg(short, long, default_value = "1")]
        axis: String,
    },
}

/// Command-line values layered over the file and environment configuration.
#[derive(Debug, Default, Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    family: Option<Family>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<String>,
}

impl Cli {
    /// Resolve the controller configuration: file, then environment, then flags.
    pub fn load_config(&self) -> Result<ControllerConfig> {
        let overrides = Overrides {
            family: self.family,
            resource: self.resource.clone(),
        };
        let figment = ControllerConfig::figment(self.config.as_deref())
            .merge(Serialized::defaults(overrides));
        ControllerConfig::from_figment(figment).context("Invalid stagectl configuration")
    }
}

/// Parse `INITIAL,FINAL,ACCEL` into a validated speed profile.
pub fn parse_speed(value: &str) -> Result<SpeedProfile, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let (initial, final_speed, accel) = match parts.as_slice() {
        [initial, final_speed, accel] => (*initial, *final_speed, *accel),
        _ => return Err(format!("expected INITIAL,FINAL,ACCEL, got '{value}'")),
    };
    let number = |field: &str| {
        field
            .parse::<u32>()
            .map_err(|e| format!("invalid speed value '{field}': {e}"))
    };
    SpeedProfile::new(number(initial)?, number(final_speed)?, number(accel)?)
        .map_err(|e| e.to_string())
}

/// Run one command on a connected controller and return the text to print.
pub fn execute(controller: &mut Controller, command: &Command) -> Result<String> {
    let family = controller.family();
    match command {
        Command::Move {
            position,
            axis,
            speed,
        } => {
            let axis = controller.resolve_axis(axis)?;
            let mut motion = MotionCommand::absolute(axis, *position);
            if let Some(profile) = speed {
                motion = motion.with_speed(*profile);
            }
            controller.execute(motion)?;
            Ok(format!("{family} axis {axis} at {position}"))
        }
        Command::MoveRel { delta, axis, speed } => {
            let axis = controller.resolve_axis(axis)?;
            let mut motion = MotionCommand::relative(axis, *delta);
            if let Some(profile) = speed {
                motion = motion.with_speed(*profile);
            }
            controller.execute(motion)?;
            Ok(format!("{family} axis {axis} moved by {delta}"))
        }
        Command::Home { axis } => {
            let axis = controller.resolve_axis(axis)?;
            controller.home(axis)?;
            Ok(format!("{family} axis {axis} homed"))
        }
        Command::Stop { all: true, .. } => {
            controller.emergency_stop()?;
            Ok(format!("{family} all axes stopped"))
        }
        Command::Stop { axis, all: false } => {
            let axis = controller.resolve_axis(axis)?;
            controller.stop(axis)?;
            Ok(format!("{family} axis {axis} stopped"))
        }
        Command::Speed {
            initial,
            final_speed,
            acceleration_time,
            axis,
        } => {
            let axis = controller.resolve_axis(axis)?;
            controller.set_speed(*initial, *final_speed, *acceleration_time, axis)?;
            Ok(format!(
                "{family} axis {axis} speed initial={initial} final={final_speed} accel={acceleration_time}"
            ))
        }
        Command::Position { axis } => {
            let axis = controller.resolve_axis(axis)?;
            let position = controller.query_position(axis)?;
            Ok(format!("{position}"))
        }
        Command::Status { axis } => {
            let axis = controller.resolve_axis(axis)?;
            let report = controller.wait_ready(axis)?;
            Ok(format!(
                "{family} axis {axis} ready after {} poll(s) in {} ms",
                report.polls,
                report.elapsed.as_millis()
            ))
        }
        Command::Check { axis } => {
            let axis = controller.resolve_axis(axis)?;
            Ok(match controller.check_error(axis)? {
                Some(fault) => fault.to_string(),
                None => format!("{family} axis {axis}: no fault"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use stage_core::mock::MockTransport;
    use stage_core::PollSettings;
    use std::time::Duration;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_negative_move_with_speed() {
        let cli = Cli::try_parse_from([
            "stagectl", "--family", "gsc02", "move", "-1500", "--axis", "Axis2", "--speed",
            "100,1000,50",
        ])
        .unwrap();
        assert_eq!(cli.family, Some(Family::Gsc02));
        assert_eq!(
            cli.command,
            Command::Move {
                position: -1500,
                axis: "Axis2".into(),
                speed: Some(SpeedProfile::new(100, 1000, 50).unwrap()),
            }
        );
    }

    #[test]
    fn rejects_invalid_speed_tuple() {
        assert!(parse_speed("100,1000").is_err());
        assert!(parse_speed("0,1000,50").is_err());
        assert!(parse_speed("a,b,c").is_err());
        assert!(Cli::try_parse_from(["stagectl", "move", "1", "--speed", "200,100,1"]).is_err());
    }

    #[test]
    fn flags_override_file_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.toml");
        std::fs::write(&path, "family = \"shrc203\"\nresource = \"ASRL1::INSTR\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "stagectl",
            "--config",
            path.to_str().unwrap(),
            "--resource",
            "/dev/ttyUSB0",
            "home",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.family, Family::Shrc203);
        assert_eq!(config.resource, "/dev/ttyUSB0");
    }

    #[test]
    fn executes_commands_with_symbolic_axes() {
        let (transport, handle) = MockTransport::new();
        let mut controller = Controller::from_transport(Family::Shrc203, Box::new(transport))
            .with_poll_settings(PollSettings {
                interval: Duration::from_millis(2),
                timeout: Duration::from_millis(50),
            });
        handle.reply("!:2S", &["R"]).reply("Q:S2", &["2,+42,R"]);

        let moved = execute(
            &mut controller,
            &Command::Move {
                position: 42,
                axis: "y".into(),
                speed: None,
            },
        )
        .unwrap();
        assert_eq!(moved, "SHRC-203 axis 2 at 42");

        let position = execute(&mut controller, &Command::Position { axis: "Y".into() }).unwrap();
        assert_eq!(position, "42");
        assert_eq!(handle.writes(), vec!["A:2+P42", "G:"]);

        assert!(execute(&mut controller, &Command::Home { axis: "W".into() }).is_err());
    }
}
