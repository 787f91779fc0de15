/// Boundary to the remote bookmark service, plus the single-tab save flow

use crate::tab_data::TabInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkKind {
    Link,
}

/// Payload for creating a bookmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkRequest {
    #[serde(rename = "type")]
    pub kind: BookmarkKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl BookmarkRequest {
    /// Build a link request, or `None` when the tab has no web URL
    pub fn for_tab(tab: &TabInfo) -> Option<BookmarkRequest> {
        if !tab.is_bookmarkable() {
            return None;
        }
        Some(BookmarkRequest {
            kind: BookmarkKind::Link,
            url: tab.url.clone()?,
            title: tab.title.clone().filter(|t| !t.trim().is_empty()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkId(pub String);

impl std::fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookmarkError {
    /// The service answered with an error
    #[error("{0}")]
    Remote(String),

    /// The service could not be reached or rejected the credentials
    #[error("Something went wrong: {0}")]
    Unavailable(String),

    #[error("This page cannot be bookmarked")]
    NotBookmarkable,
}

/// Remote "create bookmark" operation. Retry and timeout policy belong to
/// the implementation, not to callers.
#[async_trait(?Send)]
pub trait BookmarkCreator {
    async fn create(&self, request: &BookmarkRequest) -> Result<BookmarkId, BookmarkError>;
}

/// Save a single tab
pub async fn save_tab<C: BookmarkCreator + ?Sized>(
    creator: &C,
    tab: &TabInfo,
) -> Result<BookmarkId, BookmarkError> {
    let request = BookmarkRequest::for_tab(tab).ok_or(BookmarkError::NotBookmarkable)?;

    match creator.create(&request).await {
        Ok(id) => {
            log::info!("Saved {} as bookmark {}", request.url, id);
            Ok(id)
        }
        Err(e) => {
            log::warn!("Failed to save {}: {}", request.url, e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::RefCell;

    struct RecordingCreator {
        requests: RefCell<Vec<BookmarkRequest>>,
        result: Result<BookmarkId, BookmarkError>,
    }

    #[async_trait(?Send)]
    impl BookmarkCreator for RecordingCreator {
        async fn create(&self, request: &BookmarkRequest) -> Result<BookmarkId, BookmarkError> {
            self.requests.borrow_mut().push(request.clone());
            self.result.clone()
        }
    }

    fn creator(result: Result<BookmarkId, BookmarkError>) -> RecordingCreator {
        RecordingCreator {
            requests: RefCell::new(Vec::new()),
            result,
        }
    }

    #[test]
    fn test_request_serializes_as_link() {
        let request = BookmarkRequest::for_tab(&TabInfo::new(1, "https://rust-lang.org", "Rust")).unwrap();

        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json, serde_json::json!({"type": "link", "url": "https://rust-lang.org", "title": "Rust"}));
    }

    #[test]
    fn test_request_omits_blank_title() {
        let request = BookmarkRequest::for_tab(&TabInfo::new(1, "https://rust-lang.org", " ")).unwrap();

        assert_eq!(request.title, None);
    }

    #[test]
    fn test_save_tab_returns_id() {
        let creator = creator(Ok(BookmarkId("bm-1".to_string())));

        let id = block_on(save_tab(&creator, &TabInfo::new(1, "https://rust-lang.org", "Rust")));

        assert_eq!(id, Ok(BookmarkId("bm-1".to_string())));
        assert_eq!(creator.requests.borrow().len(), 1);
    }

    #[test]
    fn test_save_tab_skips_internal_pages() {
        let creator = creator(Ok(BookmarkId("bm-1".to_string())));

        let result = block_on(save_tab(&creator, &TabInfo::new(1, "chrome://settings", "Settings")));

        assert_eq!(result, Err(BookmarkError::NotBookmarkable));
        assert!(creator.requests.borrow().is_empty());
    }

    #[test]
    fn test_unavailable_error_message() {
        let creator = creator(Err(BookmarkError::Unavailable("401 Unauthorized".to_string())));

        let err = block_on(save_tab(&creator, &TabInfo::new(1, "https://rust-lang.org", "Rust"))).unwrap_err();

        assert_eq!(err.to_string(), "Something went wrong: 401 Unauthorized");
    }
}
