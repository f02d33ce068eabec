//! # Stacker
//!
//! Dependency-aware orchestration of infrastructure stacks.
//!
//! A configuration declares named stacks, each rendered from a blueprint
//! with variables. Variables may look up environment values (`${key}`) or
//! outputs of other stacks (`${output Stack::Key}`); output lookups define
//! the dependency graph. Stacker then:
//!
//! - **Builds** stacks in dependency order, creating or updating only what
//!   changed
//! - **Destroys** stacks in reverse dependency order
//! - **Diffs** desired state against what is deployed, without changing it
//!
//! Independent stacks run concurrently; a failure blocks only the stacks
//! that depend on it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stacker::prelude::*;
//!
//! let config = Config::load("stacks.yaml")?;
//! let ctx = RunContext::new(
//!     Arc::new(LocalProvider::new(".stacker/state")),
//!     Arc::new(FileBlueprints::new("blueprints")),
//! )
//! .with_environment(Environment::load("prod.env")?);
//!
//! let report = Orchestrator::from_config(&config, ctx)?.build().await?;
//! std::process::exit(report.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod actions;
pub mod blueprint;
pub mod cancellation;
pub mod config;
pub mod confirm;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod executor;
pub mod graph;
pub mod hooks;
pub mod lookup;
pub mod observability;
pub mod options;
pub mod outputs;
pub mod provider;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::actions::{ActionKind, StackAction, StackOutcome};
    pub use crate::blueprint::{Blueprint, BlueprintSource, FileBlueprints};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{Config, Environment, StackDefinition};
    pub use crate::confirm::{ConfirmationGate, Confirmer, TerminalConfirmer};
    pub use crate::context::RunContext;
    pub use crate::core::{Stack, StackStatus, StatusEvent};
    pub use crate::errors::{ProviderError, StackerError};
    pub use crate::events::{ConsoleEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::{Orchestrator, RunReport, StackReport};
    pub use crate::graph::{Direction, StackGraph};
    pub use crate::hooks::{CommandHookRunner, HookDefinition, HookRunner, HookStage};
    pub use crate::options::RunOptions;
    pub use crate::outputs::OutputStore;
    pub use crate::provider::{LocalProvider, Provider, RemoteStack, StackDiff, StackRequest};
    pub use std::sync::Arc;
}
