//! InsightMap - Knowledge Graph Notes with Streamed AI Expansion
//!
//! InsightMap stores notes as flat text files, derives a graph from the
//! inline links between them, and expands notes with streamed text
//! generation delivered over Server-Sent Events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          HTTP API                            │
//! │   /graph/*              /generate_*          /request_sse    │
//! └─────┬─────────────────────────┬─────────────────────┬────────┘
//!       │                         │ create              │ consume
//! ┌─────▼──────┐   ┌──────────────▼─────────────────────▼───────┐
//! │ NodeStore  │   │            SessionRegistry                 │
//! │ files/*.md │   └──────────────────────┬─────────────────────┘
//! └─────┬──────┘                          │ task
//!       │                  ┌──────────────▼──────────────┐
//! ┌─────▼────────┐ related │        StreamPipeline       │
//! │ GraphBuilder ◄─────────┤  fragments ... __complete__ │
//! └──────────────┘         └──────────────┬──────────────┘
//!                                         │
//!                            CompletionProvider (upstream)
//! ```
//!
//! ## Modules
//!
//! - [`node`]: node file format, storage and HTTP endpoints
//! - [`graph`]: link extraction and graph derivation
//! - [`session`]: pending generation sessions
//! - [`generation`]: upstream provider, stream pipeline and SSE endpoints
//! - [`api`]: combined router and error envelope
//! - [`config`]: configuration management

pub mod api;
pub mod config;
pub mod error;
pub mod generation;
pub mod graph;
pub mod node;
pub mod session;

pub use config::InsightMapConfig;
pub use error::{Error, Result};
