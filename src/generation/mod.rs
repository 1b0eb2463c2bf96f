//! Streamed text generation
//!
//! - [`provider`]: upstream completion capability and the OpenAI-compatible client
//! - [`pipeline`]: task construction and fragment streaming
//! - [`handler`]: HTTP endpoints for sessions and the SSE feed

pub mod handler;
pub mod pipeline;
pub mod prompts;
pub mod provider;
mod sse;

pub use handler::{generation_router, GenerationState};
pub use pipeline::{
    escape_fragment, escape_line_breaks, GenerationKind, GenerationTask, StreamEvent,
    StreamPipeline, COMPLETION_SENTINEL, ESCAPED_SENTINEL, LINE_BREAK,
};
pub use provider::{ChatMessage, CompletionProvider, CompletionRequest, OpenAiProvider};
