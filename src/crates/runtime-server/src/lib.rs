//! Multi-tenant HTTP runtime for LLM-powered conversational agents.
//!
//! Clients create *assistants* (agent configurations), *threads*
//! (conversations) and *runs* (agent invocations on a thread). The server
//! executes each run by driving an agent graph, streaming incremental
//! output over SSE, persisting checkpointed state per
//! `(thread, assistant)` namespace, and enforcing per-user isolation.

pub mod api;
pub mod config;
pub mod cron;
pub mod db;
pub mod execution;
pub mod mcp;
pub mod registry;
pub mod store;
pub mod sync;

pub use api::{create_router, AppState};
pub use config::RuntimeConfig;
pub use execution::{RunLifecycle, RunSubmission};
pub use registry::GraphRegistry;
