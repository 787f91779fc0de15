/// chrome.* implementations of the storage, tab, bookmark and pacing seams

use crate::bookmark::{BookmarkCreator, BookmarkError, BookmarkId, BookmarkRequest};
use crate::config_store::ConfigStore;
use crate::host::{HostError, Pacer, TabHost};
use crate::storage::{ChangeListener, KeyValueStore, StorageChange, StorageError, Subscription};
use crate::tab_data::{SaveType, TabInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wasm_bindgen::prelude::*;

// Import JS bridge functions
#[wasm_bindgen(module = "/bridge.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn storageGet(area: &str, key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageSet(area: &str, key: &str, value: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageRemove(area: &str, key: &str) -> Result<(), JsValue>;

    fn addStorageListener(area: &str, key: &str, callback: &js_sys::Function) -> JsValue;

    fn removeStorageListener(handle: &JsValue);

    #[wasm_bindgen(catch)]
    async fn queryTabs(current_window_only: bool) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn closeTabs(tab_ids: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn closeTab(tab_id: i32) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn createBookmark(
        address: &str,
        api_key: &str,
        headers: JsValue,
        request: JsValue,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn sleep(ms: u32) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn openPopup() -> Result<(), JsValue>;
}

/// Open the action popup, e.g. after queueing a hand-off request
pub async fn open_popup() -> Result<(), String> {
    openPopup().await.map_err(|e| format!("Failed to open popup: {:?}", e))
}

/// Serialize for JS with plain objects rather than `Map`s
fn to_js<T: Serialize>(value: &T) -> Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("{:?}", e))
}

fn from_js_value(value: JsValue) -> Option<Value> {
    if value.is_null() || value.is_undefined() {
        return None;
    }
    serde_wasm_bindgen::from_value(value).ok()
}

/// chrome.storage area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    Sync,
    Session,
}

impl StorageArea {
    fn name(&self) -> &'static str {
        match self {
            StorageArea::Sync => "sync",
            StorageArea::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChromeStorage {
    area: StorageArea,
}

impl ChromeStorage {
    pub fn new(area: StorageArea) -> Self {
        ChromeStorage { area }
    }

    /// Where the settings record lives; synced across the user's browsers
    pub fn settings() -> Self {
        Self::new(StorageArea::Sync)
    }

    /// Cleared when the browser closes; used for one-shot hand-offs
    pub fn session() -> Self {
        Self::new(StorageArea::Session)
    }
}

#[async_trait(?Send)]
impl KeyValueStore for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let value = storageGet(self.area.name(), key)
            .await
            .map_err(|e| StorageError::Read {
                key: key.to_string(),
                reason: format!("{:?}", e),
            })?;
        Ok(from_js_value(value))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let value_js = to_js(&value).map_err(StorageError::Serialize)?;
        storageSet(self.area.name(), key, value_js)
            .await
            .map_err(|e| StorageError::Write {
                key: key.to_string(),
                reason: format!("{:?}", e),
            })
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        storageRemove(self.area.name(), key)
            .await
            .map_err(|e| StorageError::Write {
                key: key.to_string(),
                reason: format!("{:?}", e),
            })
    }

    fn watch(&self, key: &str, listener: ChangeListener) -> Subscription {
        let changed_key = key.to_string();
        let callback = Closure::wrap(Box::new(move |old_value: JsValue, new_value: JsValue| {
            listener(&StorageChange {
                key: changed_key.clone(),
                old_value: from_js_value(old_value),
                new_value: from_js_value(new_value),
            });
        }) as Box<dyn Fn(JsValue, JsValue)>);

        let handle = addStorageListener(self.area.name(), key, callback.as_ref().unchecked_ref());
        Subscription::new(move || {
            removeStorageListener(&handle);
            drop(callback);
        })
    }
}

/// chrome.tabs
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeTabs;

#[async_trait(?Send)]
impl TabHost for ChromeTabs {
    async fn query_tabs(&self, scope: SaveType) -> Result<Vec<TabInfo>, HostError> {
        let tabs_js = queryTabs(scope != SaveType::All)
            .await
            .map_err(|e| HostError::Query(format!("{:?}", e)))?;
        serde_wasm_bindgen::from_value(tabs_js)
            .map_err(|e| HostError::Query(format!("Failed to parse tabs: {:?}", e)))
    }

    async fn close_tabs(&self, tab_ids: &[i32]) -> Result<(), HostError> {
        let tab_ids_js = to_js(&tab_ids).map_err(HostError::Close)?;
        closeTabs(tab_ids_js)
            .await
            .map_err(|e| HostError::Close(format!("{:?}", e)))
    }

    async fn close_tab(&self, tab_id: i32) -> Result<(), HostError> {
        closeTab(tab_id)
            .await
            .map_err(|e| HostError::Close(format!("{:?}", e)))
    }
}

/// Rejection shape produced by the bridge's `createBookmark`
#[derive(Debug, Deserialize)]
struct BridgeFailure {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedBookmark {
    id: String,
}

/// Bookmark service client.
///
/// Credentials come from the settings record at each request, so one client
/// can live as long as the popup and still follow option changes.
pub struct ApiBookmarkCreator {
    settings: ConfigStore<ChromeStorage>,
}

impl ApiBookmarkCreator {
    pub fn new() -> Self {
        ApiBookmarkCreator {
            settings: ConfigStore::new(ChromeStorage::settings()),
        }
    }
}

impl Default for ApiBookmarkCreator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl BookmarkCreator for ApiBookmarkCreator {
    async fn create(&self, request: &BookmarkRequest) -> Result<BookmarkId, BookmarkError> {
        let config = self.settings.read().await;
        let address = config.address.trim_end_matches('/');
        let headers = to_js(&config.custom_headers).map_err(BookmarkError::Remote)?;
        let request_js = to_js(request).map_err(BookmarkError::Remote)?;

        let created_js = createBookmark(address, &config.api_key, headers, request_js)
            .await
            .map_err(|error| {
                let failure = serde_wasm_bindgen::from_value(error.clone()).ok();
                classify_failure(failure, format!("{:?}", error))
            })?;
        let created: CreatedBookmark = serde_wasm_bindgen::from_value(created_js)
            .map_err(|e| BookmarkError::Remote(format!("Unexpected response: {:?}", e)))?;
        Ok(BookmarkId(created.id))
    }
}

/// Map a rejected `createBookmark` call to a bookmark error.
///
/// 401/403 and network failures (no status) mean the service is unusable as
/// configured; any other status carries the service's message. Blank
/// messages fall back to the HTTP status, and `fallback` covers rejections
/// that are not bridge failures at all.
fn classify_failure(failure: Option<BridgeFailure>, fallback: String) -> BookmarkError {
    let Some(BridgeFailure { status, message }) = failure else {
        return BookmarkError::Unavailable(fallback);
    };
    let message = message.filter(|m| !m.trim().is_empty());

    match status {
        Some(status @ (401 | 403)) => {
            BookmarkError::Unavailable(message.unwrap_or_else(|| format!("HTTP {}", status)))
        }
        Some(status) => BookmarkError::Remote(message.unwrap_or_else(|| format!("HTTP {}", status))),
        None => BookmarkError::Unavailable(message.unwrap_or(fallback)),
    }
}

/// Pacer backed by `setTimeout`
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPacer {
    delay_ms: u32,
}

impl TimeoutPacer {
    pub fn new(delay_ms: u32) -> Self {
        TimeoutPacer { delay_ms }
    }
}

#[async_trait(?Send)]
impl Pacer for TimeoutPacer {
    async fn pause(&self) {
        if let Err(e) = sleep(self.delay_ms).await {
            log::debug!("Pacing timer failed: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(status: Option<u16>, message: Option<&str>) -> Option<BridgeFailure> {
        Some(BridgeFailure {
            status,
            message: message.map(str::to_string),
        })
    }

    #[test]
    fn test_classify_unauthorized_as_unavailable() {
        let error = classify_failure(failure(Some(401), Some("Invalid API key")), "raw".to_string());

        assert_eq!(error, BookmarkError::Unavailable("Invalid API key".to_string()));
        assert_eq!(error.to_string(), "Something went wrong: Invalid API key");
    }

    #[test]
    fn test_classify_forbidden_without_message() {
        let error = classify_failure(failure(Some(403), None), "raw".to_string());

        assert_eq!(error, BookmarkError::Unavailable("HTTP 403".to_string()));
    }

    #[test]
    fn test_classify_server_error_keeps_service_message() {
        let error = classify_failure(failure(Some(500), Some("Database is locked")), "raw".to_string());

        assert_eq!(error, BookmarkError::Remote("Database is locked".to_string()));
        assert_eq!(error.to_string(), "Database is locked");
    }

    #[test]
    fn test_classify_blank_message_falls_back_to_status() {
        let empty = classify_failure(failure(Some(500), Some("")), "raw".to_string());
        let blank = classify_failure(failure(Some(502), Some("  ")), "raw".to_string());
        let missing = classify_failure(failure(Some(500), None), "raw".to_string());

        assert_eq!(empty, BookmarkError::Remote("HTTP 500".to_string()));
        assert_eq!(blank, BookmarkError::Remote("HTTP 502".to_string()));
        assert_eq!(missing, BookmarkError::Remote("HTTP 500".to_string()));
    }

    #[test]
    fn test_classify_network_failure() {
        let error = classify_failure(failure(None, Some("TypeError: Failed to fetch")), "raw".to_string());

        assert_eq!(error, BookmarkError::Unavailable("TypeError: Failed to fetch".to_string()));
    }

    #[test]
    fn test_classify_unrecognised_rejection_uses_fallback() {
        assert_eq!(
            classify_failure(None, "JsValue(\"boom\")".to_string()),
            BookmarkError::Unavailable("JsValue(\"boom\")".to_string())
        );
        assert_eq!(
            classify_failure(failure(None, None), "raw".to_string()),
            BookmarkError::Unavailable("raw".to_string())
        );
    }
}
