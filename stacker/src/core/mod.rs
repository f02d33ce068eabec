//! Core domain model types for stacker.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stack status with its stable reason vocabulary
//! - Status events emitted on every transition
//! - The runtime stack handle

mod event;
mod stack;
mod status;

pub use event::StatusEvent;
pub use stack::Stack;
pub use status::{reason, StackStatus};
