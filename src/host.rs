/// Host browser primitives used by the bulk-save flow

use crate::tab_data::{SaveType, TabInfo};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    #[error("Failed to query tabs: {0}")]
    Query(String),

    #[error("Failed to close tabs: {0}")]
    Close(String),
}

/// Tab enumeration and closing
#[async_trait(?Send)]
pub trait TabHost {
    /// Tabs in every window for `SaveType::All`, the current window otherwise
    async fn query_tabs(&self, scope: SaveType) -> Result<Vec<TabInfo>, HostError>;

    /// Close all `tab_ids` in one request
    async fn close_tabs(&self, tab_ids: &[i32]) -> Result<(), HostError>;

    async fn close_tab(&self, tab_id: i32) -> Result<(), HostError>;
}

/// Delay inserted between bookmark requests so a bulk save does not flood
/// the service
#[async_trait(?Send)]
pub trait Pacer {
    async fn pause(&self);
}
