//! MCP tool loading.
//!
//! At agent-build time the runtime contacts each configured MCP server over
//! HTTP/JSON-RPC, fetches its tool definitions, and adapts them to the
//! graph's tool protocol. A failing server costs its tools, never the run.

pub mod loader;
pub mod oauth;

pub use loader::{load_tools, normalize_server_url, McpServer};
