//! Tools that interact with the content of the current page.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::Deserialize,
    sidekick_agents::tool_registry::AgentTool,
    tracing::debug,
};

use crate::bridge::BrowserBridge;

/// Read the current page as markdown, optionally scoped to a selector.
pub struct GetPageContentTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl GetPageContentTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[derive(Deserialize)]
struct GetPageContentParams {
    #[serde(default)]
    selector: Option<String>,
}

#[async_trait]
impl AgentTool for GetPageContentTool {
    fn name(&self) -> &str {
        "getPageContent"
    }

    fn description(&self) -> &str {
        "Get the markdown content of the current page. This is useful for answering questions about the page's content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "selector": {
                    "type": "string",
                    "description": "CSS selector to get specific content (optional)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let params: GetPageContentParams = serde_json::from_value(params)?;
        let content = self.bridge.page_content(params.selector.as_deref()).await?;
        Ok(serde_json::json!({ "content": content }))
    }
}

/// Click an element on the page.
pub struct ClickElementTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl ClickElementTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[derive(Deserialize)]
struct ClickElementParams {
    selector: String,
}

#[async_trait]
impl AgentTool for ClickElementTool {
    fn name(&self) -> &str {
        "clickElement"
    }

    fn description(&self) -> &str {
        "Click on an element on the page."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "selector": {
                    "type": "string",
                    "description": "CSS selector for the element to click"
                }
            },
            "required": ["selector"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let params: ClickElementParams = serde_json::from_value(params)?;
        self.bridge.click(&params.selector).await?;
        Ok(serde_json::json!({
            "success": true,
            "message": format!("Clicked element: {}", params.selector),
        }))
    }
}

/// Fill an input field, then read the value back and fail on mismatch.
pub struct FillInputTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl FillInputTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[derive(Deserialize)]
struct FillInputParams {
    selector: String,
    value: String,
}

#[async_trait]
impl AgentTool for FillInputTool {
    fn name(&self) -> &str {
        "fillInput"
    }

    fn description(&self) -> &str {
        "Fill an input field with text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "selector": {
                    "type": "string",
                    "description": "CSS selector for the input element"
                },
                "value": {
                    "type": "string",
                    "description": "Text to fill in the input"
                }
            },
            "required": ["selector", "value"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let params: FillInputParams = serde_json::from_value(params)?;
        self.bridge.fill(&params.selector, &params.value).await?;

        // Read the field back; pages with scripted inputs can silently
        // swallow the write, and the model needs to know it did not stick.
        let observed = self.bridge.field_value(&params.selector).await?;
        if observed != params.value {
            anyhow::bail!(
                "Value verification failed for {}: expected \"{}\", found \"{}\"",
                params.selector,
                params.value,
                observed
            );
        }
        debug!(selector = %params.selector, "fill verified by read-back");

        Ok(serde_json::json!({
            "success": true,
            "message": format!("Filled {} with: {}", params.selector, params.value),
            "selector": params.selector,
        }))
    }
}

/// Scroll the page to an element.
pub struct ScrollToElementTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl ScrollToElementTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[derive(Deserialize)]
struct ScrollToElementParams {
    selector: String,
}

#[async_trait]
impl AgentTool for ScrollToElementTool {
    fn name(&self) -> &str {
        "scrollToElement"
    }

    fn description(&self) -> &str {
        "Scroll the page to a specific element."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "selector": {
                    "type": "string",
                    "description": "CSS selector for the element to scroll to."
                }
            },
            "required": ["selector"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let params: ScrollToElementParams = serde_json::from_value(params)?;
        self.bridge.scroll_to(&params.selector).await?;
        Ok(serde_json::json!({
            "success": true,
            "message": format!("Scrolled to element: {}", params.selector),
        }))
    }
}

/// Simulate a key press on an element.
pub struct SimulateKeyPressTool {
    bridge: Arc<dyn BrowserBridge>,
}

impl SimulateKeyPressTool {
    pub fn new(bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { bridge }
    }
}

#[derive(Deserialize)]
struct SimulateKeyPressParams {
    selector: String,
    key: String,
}

#[async_trait]
impl AgentTool for SimulateKeyPressTool {
    fn name(&self) -> &str {
        "simulateKeyPress"
    }

    fn description(&self) -> &str {
        "Simulate a key press event on a specific element."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "selector": {
                    "type": "string",
                    "description": "CSS selector for the element to trigger the key press on."
                },
                "key": {
                    "type": "string",
                    "description": "The key to press (e.g., 'Enter', 'Escape')."
                }
            },
            "required": ["selector", "key"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        let params: SimulateKeyPressParams = serde_json::from_value(params)?;
        self.bridge.key_press(&params.selector, &params.key).await?;
        Ok(serde_json::json!({
            "success": true,
            "message": format!("Pressed {} on {}", params.key, params.selector),
        }))
    }
}
