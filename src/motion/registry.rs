//! Axis registry: binds G-code axis slots to manual steppers.
//!
//! At most one stepper per slot and at most one slot per stepper. Both
//! directions are kept in sync by every mutation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical axis slot a stepper can be driven through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisId(pub u8);

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("axis {axis} is already bound to {owner}")]
    AxisInUse { axis: AxisId, owner: String },
    #[error("{actuator} is already registered as axis {axis}")]
    AlreadyRegistered { actuator: String, axis: AxisId },
}

#[derive(Debug, Clone, Default)]
pub struct AxisRegistry {
    by_axis: BTreeMap<AxisId, String>,
    by_actuator: HashMap<String, AxisId>,
}

impl AxisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `actuator` to `axis`. Binding an existing pair again is accepted.
    pub fn register(&mut self, actuator: &str, axis: AxisId) -> Result<(), RegistryError> {
        if let Some(owner) = self.by_axis.get(&axis) {
            if owner == actuator {
                return Ok(());
            }
            return Err(RegistryError::AxisInUse { axis, owner: owner.clone() });
        }
        if let Some(&existing) = self.by_actuator.get(actuator) {
            return Err(RegistryError::AlreadyRegistered {
                actuator: actuator.to_string(),
                axis: existing,
            });
        }
        self.by_axis.insert(axis, actuator.to_string());
        self.by_actuator.insert(actuator.to_string(), axis);
        Ok(())
    }

    /// Remove the actuator's binding, returning the slot it held. Unregistering
    /// an actuator with no binding returns `None` and changes nothing.
    pub fn unregister(&mut self, actuator: &str) -> Option<AxisId> {
        let axis = self.by_actuator.remove(actuator)?;
        self.by_axis.remove(&axis);
        Some(axis)
    }

    pub fn axis_of(&self, actuator: &str) -> Option<AxisId> {
        self.by_actuator.get(actuator).copied()
    }

    pub fn actuator_on(&self, axis: AxisId) -> Option<&str> {
        self.by_axis.get(&axis).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_axis.is_empty()
    }

    /// Bindings ordered by axis slot.
    pub fn iter(&self) -> impl Iterator<Item = (AxisId, &str)> {
        self.by_axis.iter().map(|(axis, name)| (*axis, name.as_str()))
    }
}
