//! Network clients.
//!
//! - [`HttpTrainingService`] talks to the remote training service
//! - [`retry`] provides exponential backoff for its calls

pub mod retry;
mod training_client;

pub use retry::{retry_async, RetryPolicy};
pub use training_client::HttpTrainingService;
