//! Explanation of finished records through an external chat-completion service.

pub mod client;

pub use client::{ExplainClient, ExplainError};
