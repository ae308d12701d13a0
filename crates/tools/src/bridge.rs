//! The seam between browser tools and the extension messaging layer.
//!
//! Tools never talk to the page directly; they go through a
//! [`BrowserBridge`], which the embedding shell implements on top of its
//! background/content-script plumbing. Keeping the seam async and fallible
//! lets bridge errors surface as ordinary tool failures.

use {anyhow::Result, async_trait::async_trait, serde::Serialize};

/// Metadata for one open browser tab.
#[derive(Debug, Clone, Serialize)]
pub struct TabInfo {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub active: bool,
}

/// Direction for history navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    Back,
    Forward,
}

impl HistoryDirection {
    /// Parse the model-supplied action string.
    pub fn parse(action: &str) -> Result<Self> {
        match action {
            "back" => Ok(Self::Back),
            "forward" => Ok(Self::Forward),
            other => anyhow::bail!("action must be 'back' or 'forward', got '{other}'"),
        }
    }
}

/// Browser operations the tool catalogue is built on.
#[async_trait]
pub trait BrowserBridge: Send + Sync {
    async fn current_tab(&self) -> Result<TabInfo>;
    async fn list_tabs(&self) -> Result<Vec<TabInfo>>;
    /// Tabs whose title matches `query`.
    async fn query_tabs(&self, query: &str) -> Result<Vec<TabInfo>>;
    async fn switch_to_tab(&self, tab_id: i64) -> Result<()>;
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn history_nav(&self, direction: HistoryDirection) -> Result<()>;
    /// Markdown rendering of the current page, optionally scoped to a selector.
    async fn page_content(&self, selector: Option<&str>) -> Result<String>;
    async fn click(&self, selector: &str) -> Result<()>;
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;
    /// Current value of an input/textarea/contenteditable element.
    async fn field_value(&self, selector: &str) -> Result<String>;
    async fn scroll_to(&self, selector: &str) -> Result<()>;
    async fn key_press(&self, selector: &str, key: &str) -> Result<()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn history_direction_parses_known_actions() {
        assert_eq!(HistoryDirection::parse("back").unwrap(), HistoryDirection::Back);
        assert_eq!(
            HistoryDirection::parse("forward").unwrap(),
            HistoryDirection::Forward
        );
    }

    #[test]
    fn history_direction_rejects_unknown_action() {
        let err = HistoryDirection::parse("sideways").unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }
}
