//! Shared in-memory bridge double for tool tests.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use {anyhow::Result, async_trait::async_trait};

use crate::bridge::{BrowserBridge, HistoryDirection, TabInfo};

/// Records every bridge call and keeps a tiny in-memory "page".
#[derive(Default)]
pub struct MockBridge {
    page_content: Mutex<String>,
    tabs: Mutex<Vec<TabInfo>>,
    fields: Mutex<HashMap<String, String>>,
    clicks: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
    key_presses: Mutex<Vec<(String, String)>>,
    history_moves: Mutex<Vec<HistoryDirection>>,
    next_failure: Mutex<Option<String>>,
    swallow_fills: Mutex<bool>,
}

#[allow(clippy::unwrap_used)]
impl MockBridge {
    pub fn set_page_content(&self, content: &str) {
        *self.page_content.lock().unwrap() = content.to_string();
    }

    pub fn set_tabs(&self, tabs: Vec<TabInfo>) {
        *self.tabs.lock().unwrap() = tabs;
    }

    /// Make the next page-affecting bridge call fail with this message.
    pub fn fail_next(&self, message: &str) {
        *self.next_failure.lock().unwrap() = Some(message.to_string());
    }

    /// Silently drop fill writes, simulating a scripted input that resets
    /// itself; read-back verification should then fail.
    pub fn swallow_fills(&self) {
        *self.swallow_fills.lock().unwrap() = true;
    }

    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn key_presses(&self) -> Vec<(String, String)> {
        self.key_presses.lock().unwrap().clone()
    }

    pub fn history_moves(&self) -> Vec<HistoryDirection> {
        self.history_moves.lock().unwrap().clone()
    }

    pub fn field(&self, selector: &str) -> Option<String> {
        self.fields.lock().unwrap().get(selector).cloned()
    }

    fn take_failure(&self) -> Result<()> {
        if let Some(message) = self.next_failure.lock().unwrap().take() {
            anyhow::bail!(message);
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[async_trait]
impl BrowserBridge for MockBridge {
    async fn current_tab(&self) -> Result<TabInfo> {
        self.tabs
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.active)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no active tab"))
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        Ok(self.tabs.lock().unwrap().clone())
    }

    async fn query_tabs(&self, query: &str) -> Result<Vec<TabInfo>> {
        let query = query.to_lowercase();
        Ok(self
            .tabs
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.title.to_lowercase().contains(&query))
            .cloned()
            .collect())
    }

    async fn switch_to_tab(&self, tab_id: i64) -> Result<()> {
        let mut tabs = self.tabs.lock().unwrap();
        if !tabs.iter().any(|t| t.id == tab_id) {
            anyhow::bail!("no tab with id {tab_id}");
        }
        for tab in tabs.iter_mut() {
            tab.active = tab.id == tab_id;
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.take_failure()?;
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn history_nav(&self, direction: HistoryDirection) -> Result<()> {
        self.history_moves.lock().unwrap().push(direction);
        Ok(())
    }

    async fn page_content(&self, _selector: Option<&str>) -> Result<String> {
        self.take_failure()?;
        Ok(self.page_content.lock().unwrap().clone())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.take_failure()?;
        self.clicks.lock().unwrap().push(selector.to_string());
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.take_failure()?;
        if !*self.swallow_fills.lock().unwrap() {
            self.fields
                .lock()
                .unwrap()
                .insert(selector.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn field_value(&self, selector: &str) -> Result<String> {
        Ok(self
            .fields
            .lock()
            .unwrap()
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn scroll_to(&self, _selector: &str) -> Result<()> {
        self.take_failure()?;
        Ok(())
    }

    async fn key_press(&self, selector: &str, key: &str) -> Result<()> {
        self.take_failure()?;
        self.key_presses
            .lock()
            .unwrap()
            .push((selector.to_string(), key.to_string()));
        Ok(())
    }
}
