//! Application Layer - Use cases
//!
//! `RunCoordinator` wires providers, reconciler and store into one refresh.

pub mod coordinator;

pub use coordinator::{CoordinatorConfig, RunCoordinator, DEFAULT_MAX_TOKENS_PER_CHAIN};
