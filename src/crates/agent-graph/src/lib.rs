//! Agent graph execution engine.
//!
//! This crate is the state machine the runtime server drives: a compiled
//! tool-calling agent that alternates between chat-model calls and tool
//! calls, writing a checkpoint after every step and emitting incremental
//! events that the server's streaming layer turns into SSE.
//!
//! The server treats the agent as a black box with three touch points:
//!
//! - [`CompiledAgent::stream`] / [`CompiledAgent::invoke`] to execute
//! - [`CompiledAgent::get_state`] / [`CompiledAgent::get_history`] to read
//!   checkpointed state back
//! - [`RunnableConfig`] to scope execution to a
//!   `(thread_id, checkpoint_ns)` pair

pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod llm;
pub mod messages;
pub mod store;
pub mod tool;

pub use agent::{AgentState, CompiledAgent};
pub use config::RunnableConfig;
pub use error::{GraphError, Result};
pub use event::{AgentEvent, EventMetadata, MessageChunk};
pub use llm::{ChatModel, ChatRequest, ChatResponse, StreamChunk, ToolDefinition, UsageMetadata};
pub use messages::{add_messages, Message, MessageRole, ToolCall};
pub use store::{AgentStore, InMemoryStore, Namespace, StoreItem};
pub use tool::Tool;
