//! Tool registry
//!
//! A static table of tools keyed by name. Registration rejects duplicates and
//! listing is ordered by name so `tools/list` output is deterministic.

use super::tool::Tool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Tool with this name already exists
    DuplicateTool(String),
    /// Tool not found
    NotFound(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateTool(name) => {
                write!(f, "Tool '{}' is already registered", name)
            }
            RegistryError::NotFound(name) => {
                write!(f, "Tool '{}' not found", name)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Tool information for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl From<&dyn Tool> for ToolSummary {
    fn from(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.schema().parameters,
        }
    }
}

/// Registry of callable tools
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    ///
    /// Returns an error if a tool with the same name is already registered.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Register multiple tools at once
    pub fn register_all(&mut self, tools: Vec<Arc<dyn Tool>>) -> Result<(), RegistryError> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Get a tool or a `NotFound` error
    pub fn require(&self, name: &str) -> Result<&Arc<dyn Tool>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in listing order
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Name-ordered summaries for `tools/list`
    pub fn list(&self) -> Vec<ToolSummary> {
        self.tools
            .values()
            .map(|t| ToolSummary::from(t.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolError, ToolExecutionContext, ToolMetadata, ToolOutput, ToolSchema};
    use async_trait::async_trait;

    struct NamedTool {
        metadata: ToolMetadata,
    }

    impl NamedTool {
        fn new(name: &str) -> Arc<dyn Tool> {
            Arc::new(Self {
                metadata: ToolMetadata::new(name, format!("{} tool", name)),
            })
        }
    }

    #[async_trait]
    impl Tool for NamedTool {
        fn metadata(&self) -> &ToolMetadata {
            &self.metadata
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema::empty()
        }

        async fn execute(
            &self,
            _args: serde_json::Value,
            _ctx: &ToolExecutionContext,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(self.metadata.name.clone()))
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(NamedTool::new("speak")).unwrap();

        assert!(registry.contains("speak"));
        assert!(registry.get("speak").is_some());
        assert_eq!(
            registry.require("photo").err(),
            Some(RegistryError::NotFound("photo".to_string()))
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(NamedTool::new("speak")).unwrap();

        let err = registry.register(NamedTool::new("speak")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("speak".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_listing_is_name_ordered() {
        let mut registry = ToolRegistry::new();
        registry
            .register_all(vec![
                NamedTool::new("zeta"),
                NamedTool::new("alpha"),
                NamedTool::new("mid"),
            ])
            .unwrap();

        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
        let listed: Vec<String> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(listed, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let mut registry = ToolRegistry::new();
        registry.register(NamedTool::new("alpha")).unwrap();

        let json = serde_json::to_value(registry.list()).unwrap();
        assert_eq!(json[0]["name"], "alpha");
        assert_eq!(json[0]["inputSchema"]["type"], "object");
    }
}
