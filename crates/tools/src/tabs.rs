//! Tools for inspecting and switching browser tabs.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::Deserialize,
    sidekick_agents::tool_registry::AgentTool,
};

use crate::bridge::BrowserBridge;

/// Information about the active tab.
pub struct GetCurrentTabTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl GetCurrentTabTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl AgentTool for GetCurrentTabTool {
    fn name(&self) -> &str {
        "getCurrentTab"
    }

    fn description(&self) -> &str {
        "Get information about the current active tab"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<serde_json::Value> {
        let tab = self.bridge.current_tab().await?;
        Ok(serde_json::to_value(tab)?)
    }
}

/// List all open tabs.
pub struct ListTabsTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl ListTabsTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl AgentTool for ListTabsTool {
    fn name(&self) -> &str {
        "listTabs"
    }

    fn description(&self) -> &str {
        "List all open tabs."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<serde_json::Value> {
        let tabs = self.bridge.list_tabs().await?;
        Ok(serde_json::json!({ "tabs": tabs }))
    }
}

/// Find open tabs by title.
pub struct QueryTabsTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl QueryTabsTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[derive(Deserialize)]
struct QueryTabsParams {
    query: String,
}

#[async_trait]
impl AgentTool for QueryTabsTool {
    fn name(&self) -> &str {
        "queryTabs"
    }

    fn description(&self) -> &str {
        "Query open tabs to find a specific tab by title."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The title to search for in open tabs."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let params: QueryTabsParams = serde_json::from_value(params)?;
        let tabs = self.bridge.query_tabs(&params.query).await?;
        Ok(serde_json::json!({ "tabs": tabs }))
    }
}

/// Switch to a tab by id.
pub struct SwitchToTabTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl SwitchToTabTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[derive(Deserialize)]
struct SwitchToTabParams {
    #[serde(rename = "tabId")]
    tab_id: i64,
}

#[async_trait]
impl AgentTool for SwitchToTabTool {
    fn name(&self) -> &str {
        "switchToTab"
    }

    fn description(&self) -> &str {
        "Switch to a specific tab by its ID."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tabId": {
                    "type": "number",
                    "description": "The ID of the tab to switch to."
                }
            },
            "required": ["tabId"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let params: SwitchToTabParams = serde_json::from_value(params)?;
        self.bridge.switch_to_tab(params.tab_id).await?;
        Ok(serde_json::json!({
            "success": true,
            "message": format!("Switched to tab {}", params.tab_id),
        }))
    }
}
