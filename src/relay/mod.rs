//! Relay layer
//!
//! Dispatches shaped requests to the OpenAI-compatible model runner, with
//! retry and incremental SSE decoding for streamed chat completions.

mod client;
mod retry;
mod sse;

pub use client::*;
pub use retry::*;
pub use sse::*;
