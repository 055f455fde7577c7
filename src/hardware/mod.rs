// src/hardware/mod.rs - Manual steppers (pumps) and the named-object table
use std::collections::BTreeMap;

use thiserror::Error;

use crate::motion::trapq::TrapQueue;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HardwareError {
    #[error("Unknown config object 'manual_stepper {0}'")]
    NotFound(String),
    #[error("Duplicate manual_stepper '{0}'")]
    Duplicate(String),
}

/// One manual stepper, e.g. a peristaltic pump.
#[derive(Debug, Clone)]
pub struct ManualStepper {
    name: String,
    enabled: bool,
    position: f64,
    trapq: Option<TrapQueue>,
}

impl ManualStepper {
    pub fn new(name: &str, has_trapq: bool) -> Self {
        Self {
            name: name.to_string(),
            enabled: false,
            position: 0.0,
            trapq: has_trapq.then(TrapQueue::new),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn do_enable(&mut self, enable: bool) {
        if self.enabled != enable {
            tracing::debug!("{} {}", self.name, if enable { "enabled" } else { "disabled" });
        }
        self.enabled = enable;
    }

    /// Disabling always succeeds, whatever the previous state was.
    pub fn disable(&mut self) {
        self.do_enable(false);
    }

    /// Last commanded logical position. After a cancellation this no longer
    /// tracks where the pump physically stopped.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn reset_position(&mut self, position: f64) {
        self.position = position;
    }

    /// Commanded position after a queued move.
    pub(crate) fn move_to(&mut self, position: f64) {
        self.position = position;
    }

    pub fn trapq(&self) -> Option<&TrapQueue> {
        self.trapq.as_ref()
    }

    pub fn trapq_mut(&mut self) -> Option<&mut TrapQueue> {
        self.trapq.as_mut()
    }
}

/// Lookup table of every configured manual stepper, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct StepperTable {
    steppers: BTreeMap<String, ManualStepper>,
}

impl StepperTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stepper: ManualStepper) -> Result<(), HardwareError> {
        if self.steppers.contains_key(stepper.name()) {
            return Err(HardwareError::Duplicate(stepper.name().to_string()));
        }
        self.steppers.insert(stepper.name().to_string(), stepper);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&ManualStepper, HardwareError> {
        self.steppers
            .get(name)
            .ok_or_else(|| HardwareError::NotFound(name.to_string()))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Result<&mut ManualStepper, HardwareError> {
        self.steppers
            .get_mut(name)
            .ok_or_else(|| HardwareError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.steppers.keys().cloned().collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ManualStepper> {
        self.steppers.values_mut()
    }

    pub fn len(&self) -> usize {
        self.steppers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steppers.is_empty()
    }
}
