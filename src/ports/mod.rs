//! Ports Layer - Trait definitions for external dependencies
//!
//! Following hexagonal architecture, these traits abstract:
//! - Token metadata providers (paginated HTTP sources)
//! - Logo image downloads
//! - The snapshot store (prior index + canonical file writes)

pub mod provider;
pub mod store;
pub mod mocks;

pub use provider::{Batch, BatchRequest, LogoSource, ProviderError, TokenProvider};
pub use store::{StoreError, TokenStore};
