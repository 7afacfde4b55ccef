//! Generation service client.
//!
//! Sends an instruction + request message pair to an OpenAI-compatible
//! chat-completions endpoint and returns the raw JSON text the model produced.
//! Parsing and validation of that text happen downstream in `orgenrich-core`.
//!
//! - [`Generator`] is the single-attempt seam; [`OpenAiClient`] is the HTTP implementation
//! - [`generate_with_retry`] wraps any generator in the bounded [`RetryPolicy`]

mod client;
mod retry;

pub use client::{ChatMessage, ChatRequest, Generator, OpenAiClient, OpenAiOptions, Role};
pub use retry::{RetryPolicy, generate_with_retry};
