/// Data structures for browser tabs handed to the bookmark flows
use serde::{Deserialize, Serialize};
use url::Url;

/// Information about a browser tab, as reported by `chrome.tabs.query`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub window_id: Option<i32>,
}

impl TabInfo {
    pub fn new(id: i32, url: &str, title: &str) -> TabInfo {
        TabInfo {
            id: Some(id),
            url: Some(url.to_string()),
            title: Some(title.to_string()),
            ..TabInfo::default()
        }
    }

    /// Label used in messages: the title, or the URL when there is no title
    pub fn display_label(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => self.url.as_deref().unwrap_or(""),
        }
    }

    pub fn is_bookmarkable(&self) -> bool {
        self.url.as_deref().is_some_and(is_bookmarkable_url)
    }
}

/// Which tabs a bulk save covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveType {
    /// Every tab in every window
    All,
    /// Tabs in the current window
    Window,
    #[default]
    None,
}

/// Only web pages can be bookmarked; browser and extension pages cannot
pub fn is_bookmarkable_url(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Keep the tabs that can be sent to the bookmark service, in order
pub fn bookmarkable_tabs(tabs: &[TabInfo]) -> Vec<TabInfo> {
    tabs.iter().filter(|tab| tab.is_bookmarkable()).cloned().collect()
}
