/// Tab Bookmarker - Chrome Extension for saving tabs to a bookmark service
/// Built with Rust + WASM + Yew

pub mod bookmark;
pub mod browser;
pub mod bulk_save;
pub mod config;
pub mod config_store;
pub mod handoff;
pub mod host;
pub mod storage;
pub mod tab_data;
pub mod ui;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Re-export URL filtering for JavaScript access (context menus, badge)
#[wasm_bindgen]
pub fn is_bookmarkable_url(url: &str) -> bool {
    tab_data::is_bookmarkable_url(url)
}

// Start the Yew app for the popup
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}

/// Hand a "save tabs" request to the popup and open it.
/// Called by the background worker from context-menu and command handlers.
#[wasm_bindgen]
pub async fn queue_bulk_save(scope: String) -> Result<(), JsValue> {
    let save_type = match scope.as_str() {
        "all" => tab_data::SaveType::All,
        "window" => tab_data::SaveType::Window,
        other => return Err(JsValue::from_str(&format!("Unknown save scope: {}", other))),
    };

    handoff::request_bulk_save(&browser::ChromeStorage::session(), save_type)
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    browser::open_popup().await.map_err(|e| JsValue::from_str(&e))
}
