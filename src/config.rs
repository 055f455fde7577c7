//! # Host Configuration
//!
//! ```toml
//! [enose_control]
//! pump_names = ["pump_2", "pump_3", "pump_4", "pump_5"]
//! zero_position_on_stop = true
//!
//! [motion]
//! safety_margin = 0.1
//! step_gen_window = 0.7
//!
//! [steppers.pump_2]
//! axis = 2
//!
//! [steppers.valve_carousel]
//! has_trapq = true
//! ```
//!
//! Every section is optional. Without a `[steppers]` section one default
//! stepper is created per default pump. A pump named in `pump_names` with no
//! matching stepper is reported as not found at stop time; `[steppers]`
//! entries that are not pumps are only touched by `FAST_STOP`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::motion::registry::AxisId;
use crate::motion::watermark::DEFAULT_SAFETY_MARGIN;
use crate::scheduler::DEFAULT_REACTOR_CAPACITY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub enose_control: EnoseControlConfig,
    #[serde(default)]
    pub mcu: McuConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub reactor: ReactorConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default = "default_steppers")]
    pub steppers: BTreeMap<String, StepperConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enose_control: EnoseControlConfig::default(),
            mcu: McuConfig::default(),
            motion: MotionConfig::default(),
            reactor: ReactorConfig::default(),
            web: WebConfig::default(),
            steppers: default_steppers(),
        }
    }
}

/// Pump list and stop behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnoseControlConfig {
    /// Default cancellation targets, in order.
    #[serde(default = "default_pump_names")]
    pub pump_names: Vec<String>,
    #[serde(default = "default_true")]
    pub zero_position_on_stop: bool,
}

impl Default for EnoseControlConfig {
    fn default() -> Self {
        Self {
            pump_names: default_pump_names(),
            zero_position_on_stop: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct McuConfig {
    #[serde(default)]
    pub serial: String,
    /// Offset between host monotonic time and MCU print time (seconds).
    #[serde(default)]
    pub print_time_offset: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
    /// How far ahead of the MCU steps are generated. Also the amount of motion
    /// that can still run after a stop.
    #[serde(default = "default_step_gen_window")]
    pub step_gen_window: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            safety_margin: default_safety_margin(),
            step_gen_window: default_step_gen_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReactorConfig {
    #[serde(default = "default_reactor_capacity")]
    pub capacity: usize,
    /// Period of the background step generation tick (milliseconds).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            capacity: default_reactor_capacity(),
            tick_ms: default_tick_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Manual stepper configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepperConfig {
    #[serde(default = "default_true")]
    pub has_trapq: bool,
    /// Axis slot to register at startup.
    #[serde(default)]
    pub axis: Option<AxisId>,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self { has_trapq: true, axis: None }
    }
}

fn default_pump_names() -> Vec<String> {
    ["pump_2", "pump_3", "pump_4", "pump_5"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_steppers() -> BTreeMap<String, StepperConfig> {
    default_pump_names()
        .into_iter()
        .map(|name| (name, StepperConfig::default()))
        .collect()
}
fn default_true() -> bool { true }
fn default_safety_margin() -> f64 { DEFAULT_SAFETY_MARGIN }
fn default_step_gen_window() -> f64 { 0.7 }
fn default_reactor_capacity() -> usize { DEFAULT_REACTOR_CAPACITY }
fn default_tick_ms() -> u64 { 10 }
fn default_bind() -> String { "0.0.0.0:3000".to_string() }

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let motion = &self.motion;
        if !motion.safety_margin.is_finite() || motion.safety_margin < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "motion.safety_margin must be a non-negative number, got {}",
                motion.safety_margin
            )));
        }
        if !motion.step_gen_window.is_finite() || motion.step_gen_window <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "motion.step_gen_window must be positive, got {}",
                motion.step_gen_window
            )));
        }
        if self.reactor.capacity == 0 {
            return Err(ConfigError::Invalid("reactor.capacity must be at least 1".to_string()));
        }
        let mut seen = HashSet::new();
        for name in &self.enose_control.pump_names {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("empty pump name".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate pump name '{}'", name)));
            }
        }
        let mut axes = HashSet::new();
        for (name, stepper) in &self.steppers {
            if let Some(axis) = stepper.axis {
                if !axes.insert(axis) {
                    return Err(ConfigError::Invalid(format!(
                        "axis {} assigned twice (second on '{}')",
                        axis, name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Configured pumps that have no matching `[steppers]` entry.
    pub fn missing_pumps(&self) -> Vec<&str> {
        self.enose_control
            .pump_names
            .iter()
            .filter(|name| !self.steppers.contains_key(*name))
            .map(String::as_str)
            .collect()
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.enose_control.pump_names, default_pump_names());
        assert!(config.enose_control.zero_position_on_stop);
        assert_eq!(config.motion.safety_margin, 0.1);
        assert_eq!(config.reactor.capacity, DEFAULT_REACTOR_CAPACITY);
        assert_eq!(config.steppers.len(), 4);
        assert!(config.missing_pumps().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_steppers_replace_defaults() {
        let config: Config = toml::from_str(
            r#"
            [enose_control]
            pump_names = ["pump_b", "pump_a", "pump_ghost"]

            [steppers.carousel]
            has_trapq = false

            [steppers.pump_a]
            axis = 3

            [steppers.pump_b]
            "#,
        )
        .unwrap();
        assert_eq!(config.steppers.len(), 3);
        assert_eq!(config.steppers["pump_a"].axis, Some(AxisId(3)));
        assert!(config.steppers["pump_b"].has_trapq);
        assert!(!config.steppers["carousel"].has_trapq);
        assert_eq!(config.missing_pumps(), vec!["pump_ghost"]);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.motion.safety_margin = -0.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.enose_control.pump_names = vec!["p".into(), "p".into()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config: Config = toml::from_str(
            r#"
            [steppers.a]
            axis = 2
            [steppers.b]
            axis = 2
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
