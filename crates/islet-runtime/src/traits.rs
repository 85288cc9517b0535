//! Interfaces to the external collaborators the orchestrator consumes.

use async_trait::async_trait;
use islet_core::{ErrorRecord, ToolDescriptor};
use serde_json::Value;

/// The tool registry: where MCP tools come from.
///
/// Invocation errors propagate as [`ErrorRecord`]s whose `source` names
/// the qualified tool.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// List every registered tool.
    async fn list_tools(&self) -> Vec<ToolDescriptor>;

    /// Invoke a tool by qualified `namespace:tool` name.
    async fn invoke(&self, qualified_name: &str, params: Value) -> Result<Value, ErrorRecord>;
}

/// An empty registry, for installations without MCP servers.
pub struct EmptyToolRegistry;

#[async_trait]
impl ToolRegistry for EmptyToolRegistry {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        Vec::new()
    }

    async fn invoke(&self, qualified_name: &str, _params: Value) -> Result<Value, ErrorRecord> {
        Err(
            ErrorRecord::new(islet_core::ErrorKind::Downstream, "no such tool")
                .with_source(qualified_name),
        )
    }
}
