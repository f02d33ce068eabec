//! Test doubles for driving the orchestrator without infrastructure.
//!
//! - [`FakeProvider`]: in-memory provider with call recording, failure
//!   injection and concurrency tracking
//! - [`StaticBlueprints`]: blueprints keyed by class path
//! - [`ScriptedConfirmer`]: pre-programmed yes/no answers
//! - [`RecordingHooks`]: build hooks that are recorded, not executed

mod blueprints;
mod confirmer;
mod hooks;
mod provider;

pub use blueprints::{template, StaticBlueprints};
pub use confirmer::ScriptedConfirmer;
pub use hooks::RecordingHooks;
pub use provider::{FakeProvider, ProviderCall};
