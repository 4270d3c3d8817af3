//! Object-safe tool protocol.

use crate::error::Result;
use crate::llm::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;

/// A callable tool exposed to the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the tool arguments.
    fn schema(&self) -> Value;

    /// Invoke the tool with JSON arguments.
    async fn call(&self, args: Value) -> Result<Value>;

    /// Definition handed to the chat model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.schema())
    }
}
