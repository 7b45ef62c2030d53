//! Rollback tools: compensating operations registered against regular
//! tools, invoked to undo external side effects during rollback.

use std::collections::HashMap;
use std::sync::Arc;

use crate::tools::{Tool, ToolError};

/// Maps a regular tool's name to the tool that compensates it.
#[derive(Default)]
pub struct RollbackToolRegistry {
    by_tool: HashMap<String, Arc<dyn Tool>>,
}

impl RollbackToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rollback tool for the named regular tool; one per name.
    pub fn register(
        &mut self,
        tool_name: impl Into<String>,
        rollback: Arc<dyn Tool>,
    ) -> Result<(), ToolError> {
        let tool_name = tool_name.into();
        if self.by_tool.contains_key(&tool_name) {
            return Err(ToolError::DuplicateTool(tool_name));
        }
        self.by_tool.insert(tool_name, rollback);
        Ok(())
    }

    /// Rollback tool for a regular tool, when one is registered.
    pub fn get(&self, tool_name: &str) -> Option<Arc<dyn Tool>> {
        self.by_tool.get(tool_name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_tools::EvalTool;

    /// **Scenario**: One rollback tool per regular tool name.
    #[test]
    fn register_and_lookup() {
        let mut registry = RollbackToolRegistry::new();
        registry.register("create_file", Arc::new(EvalTool)).unwrap();
        assert!(registry.get("create_file").is_some());
        assert!(registry.get("other").is_none());
        let err = registry.register("create_file", Arc::new(EvalTool)).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateTool(_)));
    }
}
