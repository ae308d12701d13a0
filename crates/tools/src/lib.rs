//! Browser tool catalogue for the sidekick agent.
//!
//! Every tool delegates to a [`BrowserBridge`] implemented by the embedding
//! shell on top of its extension messaging; the tools themselves only parse
//! arguments, call the bridge, and shape results for the model.

use std::sync::Arc;

use sidekick_agents::tool_registry::ToolRegistry;

pub mod bridge;
pub mod nav;
pub mod page;
pub mod tabs;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    bridge::{BrowserBridge, HistoryDirection, TabInfo},
    nav::{HistoryNavTool, NavigateToUrlTool, SearchGoogleTool},
    page::{
        ClickElementTool, FillInputTool, GetPageContentTool, ScrollToElementTool,
        SimulateKeyPressTool,
    },
    tabs::{GetCurrentTabTool, ListTabsTool, QueryTabsTool, SwitchToTabTool},
};

/// Register the full browser tool set against one bridge.
pub fn register_browser_tools(registry: &mut ToolRegistry, bridge: Arc<dyn BrowserBridge>) {
    registry.register(Box::new(GetCurrentTabTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(ClickElementTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(FillInputTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(NavigateToUrlTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(SearchGoogleTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(GetPageContentTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(ScrollToElementTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(QueryTabsTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(SwitchToTabTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(ListTabsTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(HistoryNavTool::new(Arc::clone(&bridge))));
    registry.register(Box::new(SimulateKeyPressTool::new(bridge)));
}
