use serde::{Deserialize, Serialize};

/// Top-level sidekick configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SidekickConfig {
    pub agent: AgentSection,
    pub tools: ToolsSection,
}

/// Agent loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Maximum request/response cycles per run. 0 falls back to the default.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Override for the base persona text. `None` uses the built-in persona.
    pub system_prompt: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: None,
        }
    }
}

fn default_max_iterations() -> usize {
    10
}

/// Tool execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// Maximum bytes for a single tool result before truncation. Default 64KB.
    #[serde(default = "default_max_tool_result_bytes")]
    pub max_tool_result_bytes: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            max_tool_result_bytes: default_max_tool_result_bytes(),
        }
    }
}

fn default_max_tool_result_bytes() -> usize {
    65_536
}
