//! Builds connected controllers from TOML configuration tables.
//!
//! ```rust,ignore
//! use stage_driver_optosigma::ControllerFactory;
//!
//! let config = toml::toml! {
//!     family = "shrc203"
//!     resource = "ASRL3::INSTR"
//!
//!     [poll]
//!     interval_ms = 100
//! };
//! let controller = ControllerFactory::serial().build_from_toml(config.into())?;
//! ```

use crate::controller::Controller;
use stage_core::{
    ControllerConfig, MotionController, ResourceManager, SerialResourceManager, StageError,
    StageResult,
};
use std::sync::Arc;
use tracing::info;

/// Factory for OptoSigma controller sessions.
#[derive(Clone)]
pub struct ControllerFactory {
    resources: Arc<dyn ResourceManager>,
}

impl std::fmt::Debug for ControllerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerFactory").finish_non_exhaustive()
    }
}

impl ControllerFactory {
    /// Factory opening local serial ports.
    pub fn serial() -> Self {
        Self::with_resources(Arc::new(SerialResourceManager))
    }

    /// Factory opening sessions through `resources`.
    pub fn with_resources(resources: Arc<dyn ResourceManager>) -> Self {
        Self { resources }
    }

    /// Driver type string used in configuration files.
    pub fn driver_type(&self) -> &'static str {
        "optosigma"
    }

    /// Human-readable driver name.
    pub fn name(&self) -> &'static str {
        "OptoSigma Stage Controller"
    }

    /// Parse and validate a controller table without opening anything.
    pub fn validate(&self, config: &toml::Value) -> StageResult<ControllerConfig> {
        let cfg: ControllerConfig = config
            .clone()
            .try_into()
            .map_err(|e| StageError::Configuration(format!("invalid controller config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build and connect a controller from a validated configuration.
    pub fn build(&self, config: &ControllerConfig) -> StageResult<Controller> {
        let mut controller = Controller::from_config(config, self.resources.clone())?;
        controller.connect(&config.resource)?;
        info!(
            family = %config.family,
            resource = %config.resource,
            "Built OptoSigma controller"
        );
        Ok(controller)
    }

    /// Validate a controller table and build a connected controller from it.
    pub fn build_from_toml(&self, config: toml::Value) -> StageResult<Controller> {
        let cfg = self.validate(&config)?;
        self.build(&cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage_core::mock::MockResourceManager;
    use stage_core::{Family, Unit};

    fn mock_factory() -> (ControllerFactory, stage_core::mock::MockHandle) {
        let (manager, handle) = MockResourceManager::new();
        (ControllerFactory::with_resources(Arc::new(manager)), handle)
    }

    #[test]
    fn test_factory_driver_type() {
        let factory = ControllerFactory::serial();
        assert_eq!(factory.driver_type(), "optosigma");
        assert_eq!(factory.name(), "OptoSigma Stage Controller");
    }

    #[test]
    fn test_factory_validate_config() {
        let (factory, _) = mock_factory();

        let valid = toml::Value::Table(toml::toml! {
            family = "shrc203"
            resource = "ASRL3::INSTR"
            default_unit = "um"
        });
        let cfg = factory.validate(&valid).unwrap();
        assert_eq!(cfg.family, Family::Shrc203);
        assert_eq!(cfg.default_unit, Unit::Micrometer);

        let unknown_family = toml::Value::Table(toml::toml! {
            family = "shot702"
            resource = "COM3"
        });
        assert!(matches!(
            factory.validate(&unknown_family),
            Err(StageError::Configuration(_))
        ));

        let missing_resource = toml::Value::Table(toml::toml! {
            family = "gsc02"
        });
        assert!(factory.validate(&missing_resource).is_err());

        let unit_on_gsc = toml::Value::Table(toml::toml! {
            family = "gsc02"
            resource = "COM3"
            default_unit = "mm"
        });
        assert!(factory.validate(&unit_on_gsc).is_err());
    }

    #[test]
    fn build_connects_with_configured_settings() {
        let (factory, handle) = mock_factory();
        let config = toml::Value::Table(toml::toml! {
            family = "shrc203"
            resource = "ASRL1::INSTR"
            io_timeout_ms = 500

            [poll]
            interval_ms = 50
            timeout_ms = 5000
        });

        let controller = factory.build_from_toml(config).unwrap();
        assert!(controller.is_connected());
        assert_eq!(controller.family(), Family::Shrc203);
        assert_eq!(controller.poll_settings().interval.as_millis(), 50);
        assert_eq!(handle.writes(), vec!["MODE:HOST"]);
        assert_eq!(handle.opened()[0].1.timeout.as_millis(), 500);
    }
}
