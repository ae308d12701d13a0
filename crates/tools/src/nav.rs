//! Navigation tools: URLs, web search, and browser history.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::Deserialize,
    sidekick_agents::tool_registry::AgentTool,
    tracing::info,
};

use crate::bridge::{BrowserBridge, HistoryDirection};

/// Navigate the current tab to a URL.
pub struct NavigateToUrlTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl NavigateToUrlTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[derive(Deserialize)]
struct NavigateToUrlParams {
    url: String,
}

#[async_trait]
impl AgentTool for NavigateToUrlTool {
    fn name(&self) -> &str {
        "navigateToUrl"
    }

    fn description(&self) -> &str {
        "Navigate to a specific URL"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to navigate to"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let params: NavigateToUrlParams = serde_json::from_value(params)?;
        info!(url = %params.url, "navigating");
        self.bridge.navigate(&params.url).await?;
        Ok(serde_json::json!({
            "success": true,
            "message": format!("Navigated to {}", params.url),
        }))
    }
}

/// Search Google for a query by navigating to the results page.
pub struct SearchGoogleTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl SearchGoogleTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[derive(Deserialize)]
struct SearchGoogleParams {
    query: String,
}

#[async_trait]
impl AgentTool for SearchGoogleTool {
    fn name(&self) -> &str {
        "searchGoogle"
    }

    fn description(&self) -> &str {
        "Search Google for a query"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let params: SearchGoogleParams = serde_json::from_value(params)?;
        let url = format!(
            "https://www.google.com/search?q={}",
            urlencoding::encode(&params.query)
        );
        self.bridge.navigate(&url).await?;
        Ok(serde_json::json!({
            "success": true,
            "message": format!("Searching Google for: {}", params.query),
            "url": url,
        }))
    }
}

/// Go back or forward in the tab's history.
pub struct HistoryNavTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl HistoryNavTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[derive(Deserialize)]
struct HistoryNavParams {
    action: String,
}

#[async_trait]
impl AgentTool for HistoryNavTool {
    fn name(&self) -> &str {
        "historyNav"
    }

    fn description(&self) -> &str {
        "Navigate forwards or backwards in the browser history."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "The history navigation action to perform. Can be 'back' or 'forward'."
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let params: HistoryNavParams = serde_json::from_value(params)?;
        let direction = HistoryDirection::parse(&params.action)?;
        self.bridge.history_nav(direction).await?;
        Ok(serde_json::json!({
            "success": true,
            "message": format!("History navigation: {}", params.action),
        }))
    }
}
