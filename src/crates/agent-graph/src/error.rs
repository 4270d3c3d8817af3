//! Error types for agent graph execution.

use thiserror::Error;

/// Errors raised while building or executing an agent graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The chat model call failed.
    #[error("Model error: {0}")]
    Model(String),

    /// A tool invocation failed.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Checkpoint persistence failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] agent_checkpoint::CheckpointError),

    /// The agent loop exceeded its recursion limit.
    #[error("Recursion limit of {0} reached without the agent finishing")]
    RecursionLimit(usize),

    /// (De)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Graph construction failed (bad configuration, unknown model, ...).
    #[error("Build error: {0}")]
    Build(String),
}

impl GraphError {
    pub fn model(msg: impl Into<String>) -> Self {
        GraphError::Model(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        GraphError::Tool(msg.into())
    }

    pub fn build(msg: impl Into<String>) -> Self {
        GraphError::Build(msg.into())
    }
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
