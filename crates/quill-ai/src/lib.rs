//! quill-ai: Unified LLM provider abstraction layer
//!
//! This crate provides a common streaming interface for interacting with
//! multiple LLM providers: OpenAI (including Azure), Anthropic, Google,
//! Ollama, and OpenRouter.

pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use providers::{Provider, create_provider};
pub use stream::EventStream;
pub use types::*;
