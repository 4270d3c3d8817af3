//! LLM provider implementations for the agent runtime.
//!
//! This crate provides concrete implementations of the `ChatModel` trait
//! from `agent-graph` for the providers the runtime supports:
//!
//! - **OpenAI** — chat completions with SSE token streaming
//! - **Anthropic** — messages API with SSE token streaming
//! - **Google** — Gemini `generateContent` (non-streaming)
//! - **Custom** — any OpenAI-compatible endpoint (vLLM, Ollama, ...) with an
//!   explicit `base_url`
//!
//! Model selection is a `provider:model` string (e.g. `openai:gpt-4o-mini`)
//! resolved through [`resolve_model`]. A bare model name defaults to the
//! OpenAI provider.
//!
//! [`ScriptedChatModel`] is a deterministic mock for tests: it replays
//! canned assistant messages and streams them in fixed-size deltas.

pub mod anthropic;
pub mod config;
pub mod custom;
pub mod error;
pub mod google;
pub mod mock;
pub mod openai;
pub mod registry;
mod sse;

pub use anthropic::AnthropicClient;
pub use config::RemoteLlmConfig;
pub use custom::CustomClient;
pub use error::{LlmError, Result};
pub use google::GoogleClient;
pub use mock::ScriptedChatModel;
pub use openai::OpenAiClient;
pub use registry::{resolve_model, ProviderKeys};

// Re-export the trait surface providers implement.
pub use agent_graph::{ChatModel, ChatRequest, ChatResponse, StreamChunk, ToolDefinition};
