//! Error types for declaration validation and convergence
//!
//! Schema errors are raised while building declarations, before any system
//! access. Every other variant is produced during a run and ends up as a
//! `Failed` outcome in the run report.

use crate::resource::ResourceKind;
use thiserror::Error;

/// A single problem found while validating a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaProblem {
    /// Offending attribute key, or `None` for problems with the name/actions
    pub key: Option<String>,
    /// What is wrong with it
    pub message: String,
}

impl SchemaProblem {
    pub(crate) fn key(key: &str, message: impl Into<String>) -> Self {
        Self {
            key: Some(key.to_string()),
            message: message.into(),
        }
    }

    pub(crate) fn general(message: impl Into<String>) -> Self {
        Self {
            key: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{key}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Errors that can occur while validating or converging resources
#[derive(Error, Debug)]
pub enum Error {
    /// Declaration does not match its kind's schema
    #[error("invalid {kind} '{name}': {}", join_problems(.problems))]
    Schema {
        kind: ResourceKind,
        name: String,
        problems: Vec<SchemaProblem>,
    },

    /// Declaration uses a resource type that does not exist
    #[error("unknown resource type '{0}'")]
    UnknownKind(String),

    /// Declaration requests an action name that does not exist
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// Current state could not be queried
    #[error("failed to probe {kind} '{name}': {source:#}")]
    Probe {
        kind: ResourceKind,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A mutation was attempted and failed
    #[error("{kind} '{name}': {source:#}")]
    Apply {
        kind: ResourceKind,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// An existing resource with the same identity is configured differently
    #[error("{kind} '{name}' already exists with different settings: {details}")]
    Conflict {
        kind: ResourceKind,
        name: String,
        details: String,
    },

    /// A license-gated install was requested without explicit acceptance
    #[error("installing '{product}' requires accepting its license (set accept_eula = true)")]
    LicenseNotAccepted { product: String },
}

impl Error {
    /// Keys named by a schema error, in declaration order
    pub fn offending_keys(&self) -> Vec<&str> {
        match self {
            Self::Schema { problems, .. } => {
                problems.iter().filter_map(|p| p.key.as_deref()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Whether this error came from validation rather than a run
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            Self::Schema { .. } | Self::UnknownKind(_) | Self::UnknownAction(_)
        )
    }
}

fn join_problems(problems: &[SchemaProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
