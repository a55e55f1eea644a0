//! Shared HTTP plumbing for provider adapters: rate limiting and retry.

mod client;
mod rate_limit;
#[cfg(test)]
pub(crate) mod stub;

pub use client::{classify_status, RetryingClient};
pub use rate_limit::RateLimiter;
