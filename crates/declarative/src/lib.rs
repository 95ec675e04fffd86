//! # Declarative
//!
//! Declare the desired state of host resources and converge a machine to it.
//!
//! A run takes an ordered list of [`ResourceDeclaration`]s. For each
//! declaration, and each of its actions in order, the engine probes the
//! current state of the resource, dispatches to the one handler registered
//! for that `(kind, action)` pair, and records what happened. Handlers are
//! idempotent: an action whose postcondition already holds reports
//! [`ActionOutcome::Unchanged`] and touches nothing.
//!
//! ## Core Concepts
//!
//! - **ResourceKind**: closed set of manageable things (services, paths,
//!   registry keys, web sites, application pools, installable products)
//! - **ResourceDeclaration**: a validated `(kind, name, attributes, actions)`
//! - **SystemControl**: the host primitives, injected so the engine can run
//!   against a real host or [`MemorySystem`]
//! - **RunReport**: append-only record of every outcome, and where a run
//!   stopped
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     Action, Engine, EngineConfig, MemorySystem, ResourceDeclaration, ResourceKind,
//! };
//!
//! let system = MemorySystem::new().with_service("w3svc", false, false);
//! let w3svc = ResourceDeclaration::builder(ResourceKind::Service, "w3svc")
//!     .actions([Action::Enable, Action::Start])
//!     .build()?;
//!
//! let report = Engine::new(&system, EngineConfig::default()).run(&[w3svc]);
//! assert!(report.is_success());
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod memory;
pub mod probe;
pub mod report;
pub mod resource;
pub mod system;
pub mod types;

// Re-export main types at crate root
pub use context::{ApplyContext, ConflictPolicy, EngineConfig, NoProgress, ProgressCallback};
pub use engine::Engine;
pub use error::{Error, Result, SchemaProblem};
pub use memory::MemorySystem;
pub use report::{ReportEntry, RunReport, RunStatus, RunSummary};
pub use resource::{
    Action, Attributes, DeclarationSpec, ResourceDeclaration, ResourceKind, Value, validate_all,
};
pub use system::{PathKind, ServiceStatus, SiteStatus, SystemControl};
pub use types::{ActionOutcome, Failure, FailureClass, ObservedState};
