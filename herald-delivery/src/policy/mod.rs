//! Policies applied around activity invocations.
//!
//! - [`RetryPolicy`]: how many attempts and how far apart
//! - [`ActivityOptions`]: start-to-close and heartbeat timeouts

pub mod retry;

pub use retry::{ActivityOptions, RetryPolicy};
