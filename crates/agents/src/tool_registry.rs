use {
    anyhow::Result,
    async_trait::async_trait,
    std::{collections::HashMap, sync::Arc},
    tracing::{info, warn},
};

use crate::model::{ToolCall, ToolResult};

/// Agent-callable tool: the catalogue entry and its handler in one.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON-schema-like parameter spec advertised to the model.
    fn parameters_schema(&self) -> serde_json::Value;
    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value>;
}

/// Registry of the tools an agent advertises and dispatches to.
///
/// The catalogue keeps first-registration order so the prompt advertises a
/// stable listing; re-registering a name replaces the entry in place, so the
/// last registration wins without producing duplicate catalogue entries.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn AgentTool>>,
    index: HashMap<String, usize>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Box<dyn AgentTool>) {
        let name = tool.name().to_string();
        let tool: Arc<dyn AgentTool> = Arc::from(tool);
        match self.index.get(&name) {
            Some(&pos) => {
                warn!(tool = %name, "replacing previously registered tool");
                self.tools[pos] = tool;
            },
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            },
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn AgentTool> {
        self.index.get(name).map(|&pos| self.tools[pos].as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Catalogue in registration order, as advertised to the model.
    pub fn list_schemas(&self) -> Vec<serde_json::Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.parameters_schema(),
                })
            })
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Execute one tool call, never failing the run: an unknown name or a
    /// handler error becomes the result's `error` field, which the loop
    /// feeds back to the model as its own feedback.
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "tool not found");
            return ToolResult {
                id: call.id.clone(),
                name: call.name.clone(),
                result: None,
                error: Some(format!("Tool \"{}\" not found", call.name)),
            };
        };

        info!(tool = %call.name, id = %call.id, args = %call.arguments, "executing tool");
        match tool.execute(call.arguments.clone()).await {
            Ok(value) => ToolResult {
                id: call.id.clone(),
                name: call.name.clone(),
                result: Some(value),
                error: None,
            },
            Err(e) => {
                warn!(tool = %call.name, id = %call.id, error = %e, "tool execution failed");
                ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    result: None,
                    error: Some(e.to_string()),
                }
            },
        }
    }
}
