/// One-shot "save all tabs" request passed from one extension surface to another
///
/// The background worker (context menu, keyboard command) leaves a request
/// in session storage and opens the popup; the popup takes it on load. Taking
/// clears the key before anything else happens, so a later unrelated popup
/// load never replays it.

use crate::storage::{KeyValueStore, StorageError};
use crate::tab_data::SaveType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const BULK_SAVE_REQUEST_KEY: &str = "pendingBulkSave";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSaveRequest {
    pub id: Uuid,
    pub save_type: SaveType,
}

pub async fn request_bulk_save<S>(store: &S, save_type: SaveType) -> Result<BulkSaveRequest, StorageError>
where
    S: KeyValueStore + ?Sized,
{
    let request = BulkSaveRequest {
        id: Uuid::new_v4(),
        save_type,
    };
    let value = serde_json::to_value(&request).map_err(|e| StorageError::Serialize(e.to_string()))?;
    store.set(BULK_SAVE_REQUEST_KEY, value).await?;
    log::debug!("Queued bulk save request {}", request.id);
    Ok(request)
}

/// Take the pending request, if any, clearing it from storage
pub async fn take_bulk_save_request<S>(store: &S) -> Option<BulkSaveRequest>
where
    S: KeyValueStore + ?Sized,
{
    let raw = match store.get(BULK_SAVE_REQUEST_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("Could not read pending bulk save request: {}", e);
            return None;
        }
    };

    if let Err(e) = store.remove(BULK_SAVE_REQUEST_KEY).await {
        log::warn!("Could not clear pending bulk save request: {}", e);
    }

    match serde_json::from_value::<BulkSaveRequest>(raw) {
        Ok(request) if request.save_type != SaveType::None => {
            log::debug!("Took bulk save request {}", request.id);
            Some(request)
        }
        Ok(_) => None,
        Err(e) => {
            log::warn!("Discarding malformed bulk save request: {}", e);
            None
        }
    }
}
