//! Core types for observed state and action outcomes

use crate::error::Error;
use crate::resource::{Attributes, Value};
use serde::{Deserialize, Serialize};

/// Current state of a resource as seen by the prober
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "attributes", rename_all = "snake_case")]
pub enum ObservedState {
    /// Resource does not exist
    Absent,
    /// Resource exists with these observable attributes
    Present(Attributes),
}

impl ObservedState {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Observed value of an attribute, if the resource exists and reports it
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Present(attributes) => attributes.get(key),
            Self::Absent => None,
        }
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}

/// Category of a failed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Current state could not be queried
    Probe,
    /// A mutation was attempted and failed
    Apply,
    /// Existing resource conflicts with the declaration
    Conflict,
    /// License acceptance was required but not given
    License,
}

/// Why an action failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub class: FailureClass,
    pub message: String,
}

impl From<&Error> for Failure {
    fn from(error: &Error) -> Self {
        let class = match error {
            Error::Probe { .. } => FailureClass::Probe,
            Error::Conflict { .. } => FailureClass::Conflict,
            Error::LicenseNotAccepted { .. } => FailureClass::License,
            _ => FailureClass::Apply,
        };
        Self {
            class,
            message: error.to_string(),
        }
    }
}

/// Result of running one action on one declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Already in the desired state
    Unchanged,
    /// A change was made
    Applied { change: String },
    /// Not attempted (disabled declaration or why-run)
    Skipped { reason: String },
    /// The action failed and the run stopped here
    Failed(Failure),
}

impl ActionOutcome {
    pub fn applied(change: impl Into<String>) -> Self {
        Self::Applied {
            change: change.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Check if the outcome represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<Error> for ActionOutcome {
    fn from(error: Error) -> Self {
        Self::Failed(Failure::from(&error))
    }
}
