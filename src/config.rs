/// Extension settings record and the rules for decoding older stored copies

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Storage key holding the serialized settings record
pub const SETTINGS_KEY: &str = "settings";

pub const DEFAULT_ADDRESS: &str = "https://cloud.karakeep.app";

/// One hour
pub const DEFAULT_BADGE_CACHE_EXPIRE_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Settings shared by the popup, options page and background worker.
///
/// A value of this type is always complete: every field carries either the
/// stored value or its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<String>,
    pub address: String,
    pub auto_save: bool,
    pub close_tabs_on_bulk_save: bool,
    pub theme: Theme,
    pub show_count_badge: bool,
    pub use_badge_cache: bool,
    pub badge_cache_expire_ms: u64,
    pub custom_headers: BTreeMap<String, String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            api_key: String::new(),
            api_key_id: None,
            address: DEFAULT_ADDRESS.to_string(),
            auto_save: false,
            close_tabs_on_bulk_save: false,
            theme: Theme::System,
            show_count_badge: false,
            use_badge_cache: true,
            badge_cache_expire_ms: DEFAULT_BADGE_CACHE_EXPIRE_MS,
            custom_headers: BTreeMap::new(),
        }
    }
}

impl Configuration {
    /// True once the user has entered an API key
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Shape of a record written by any earlier release.
///
/// `apiKey` and `address` have existed since the first release; everything
/// else was added later and may be absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredConfiguration {
    api_key: String,
    #[serde(default)]
    api_key_id: Option<String>,
    address: String,
    auto_save: Option<bool>,
    close_tabs_on_bulk_save: Option<bool>,
    theme: Option<Theme>,
    show_count_badge: Option<bool>,
    use_badge_cache: Option<bool>,
    badge_cache_expire_ms: Option<u64>,
    custom_headers: Option<BTreeMap<String, String>>,
}

impl StoredConfiguration {
    fn is_complete(&self) -> bool {
        self.auto_save.is_some()
            && self.close_tabs_on_bulk_save.is_some()
            && self.theme.is_some()
            && self.show_count_badge.is_some()
            && self.use_badge_cache.is_some()
            && self.badge_cache_expire_ms.is_some()
            && self.custom_headers.is_some()
    }

    fn with_defaults(self) -> Configuration {
        let defaults = Configuration::default();
        Configuration {
            api_key: self.api_key,
            api_key_id: self.api_key_id,
            address: self.address,
            auto_save: self.auto_save.unwrap_or(defaults.auto_save),
            close_tabs_on_bulk_save: self
                .close_tabs_on_bulk_save
                .unwrap_or(defaults.close_tabs_on_bulk_save),
            theme: self.theme.unwrap_or(defaults.theme),
            show_count_badge: self.show_count_badge.unwrap_or(defaults.show_count_badge),
            use_badge_cache: self.use_badge_cache.unwrap_or(defaults.use_badge_cache),
            badge_cache_expire_ms: self
                .badge_cache_expire_ms
                .unwrap_or(defaults.badge_cache_expire_ms),
            custom_headers: self.custom_headers.unwrap_or(defaults.custom_headers),
        }
    }
}

/// Result of decoding a raw stored value
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Record is complete and current; nothing to write back
    Current(Configuration),
    /// Record predates some fields; defaults were filled in
    Backfilled(Configuration),
    /// Record did not parse on its own but did once laid over the defaults
    Merged(Configuration),
    /// Nothing usable was stored
    Invalid,
}

impl Decoded {
    /// Whether the decoded record differs from storage and should be persisted
    pub fn needs_persist(&self) -> bool {
        matches!(self, Decoded::Backfilled(_) | Decoded::Merged(_))
    }

    pub fn into_configuration(self) -> Configuration {
        match self {
            Decoded::Current(config) | Decoded::Backfilled(config) | Decoded::Merged(config) => {
                config
            }
            Decoded::Invalid => Configuration::default(),
        }
    }
}

/// Decode a raw stored value into a complete record.
///
/// Never fails: anything unusable decodes to [`Decoded::Invalid`], which
/// callers turn into the default record.
pub fn decode(raw: Option<&Value>) -> Decoded {
    let raw = match raw {
        Some(value) if !value.is_null() => value,
        _ => return Decoded::Invalid,
    };

    match StoredConfiguration::deserialize(raw) {
        Ok(stored) if stored.is_complete() => Decoded::Current(stored.with_defaults()),
        Ok(stored) => Decoded::Backfilled(stored.with_defaults()),
        Err(e) => {
            log::debug!("Stored settings do not parse ({}), merging with defaults", e);
            merge_over_defaults(raw)
                .map(Decoded::Merged)
                .unwrap_or(Decoded::Invalid)
        }
    }
}

/// Lay the fields of a raw object over the default record and re-validate.
/// Raw fields win on conflict.
fn merge_over_defaults(raw: &Value) -> Option<Configuration> {
    let raw_fields = raw.as_object()?;

    let mut merged = match Configuration::default().to_value() {
        Ok(Value::Object(fields)) => fields,
        _ => return None,
    };
    for (key, value) in raw_fields {
        merged.insert(key.clone(), value.clone());
    }

    match serde_json::from_value::<Configuration>(Value::Object(merged)) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Stored settings are unrecoverable, using defaults: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_record() -> Value {
        json!({
            "apiKey": "secret",
            "apiKeyId": "key-1",
            "address": "https://bookmarks.example.com",
            "autoSave": true,
            "closeTabsOnBulkSave": true,
            "theme": "dark",
            "showCountBadge": true,
            "useBadgeCache": false,
            "badgeCacheExpireMs": 1000,
            "customHeaders": {"X-Team": "blue"}
        })
    }

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.api_key, "");
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert!(!config.auto_save);
        assert!(!config.close_tabs_on_bulk_save);
        assert_eq!(config.theme, Theme::System);
        assert!(config.use_badge_cache);
        assert_eq!(config.badge_cache_expire_ms, 3_600_000);
        assert!(config.custom_headers.is_empty());
        assert!(!config.is_configured());
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let value = Configuration::default().to_value().unwrap();

        assert_eq!(value["closeTabsOnBulkSave"], json!(false));
        assert_eq!(value["badgeCacheExpireMs"], json!(3_600_000));
        assert_eq!(value["theme"], json!("system"));
        assert!(value.get("apiKeyId").is_none());
    }

    #[test]
    fn test_decode_complete_record() {
        let raw = full_record();

        let decoded = decode(Some(&raw));

        assert!(!decoded.needs_persist());
        let config = decoded.into_configuration();
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.api_key_id.as_deref(), Some("key-1"));
        assert_eq!(config.theme, Theme::Dark);
        assert_eq!(config.custom_headers.get("X-Team").map(String::as_str), Some("blue"));
    }

    #[test]
    fn test_decode_backfills_later_fields() {
        let raw = json!({"apiKey": "secret", "address": "https://bookmarks.example.com"});

        let decoded = decode(Some(&raw));

        match decoded {
            Decoded::Backfilled(config) => {
                assert_eq!(config.api_key, "secret");
                assert_eq!(config.address, "https://bookmarks.example.com");
                assert!(!config.close_tabs_on_bulk_save);
                assert!(config.use_badge_cache);
            }
            other => panic!("expected backfill, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_merges_record_missing_required_key() {
        let raw = json!({"theme": "light", "autoSave": true});

        match decode(Some(&raw)) {
            Decoded::Merged(config) => {
                assert_eq!(config.api_key, "");
                assert_eq!(config.address, DEFAULT_ADDRESS);
                assert_eq!(config.theme, Theme::Light);
                assert!(config.auto_save);
            }
            other => panic!("expected merge, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_wrongly_typed_field() {
        let raw = json!({"apiKey": "secret", "address": "x", "autoSave": "yes"});

        assert_eq!(decode(Some(&raw)), Decoded::Invalid);
    }

    #[test]
    fn test_decode_rejects_negative_expiry() {
        let mut raw = full_record();
        raw["badgeCacheExpireMs"] = json!(-5);

        assert_eq!(decode(Some(&raw)), Decoded::Invalid);
    }

    #[test]
    fn test_decode_missing_value() {
        assert_eq!(decode(None), Decoded::Invalid);
        assert_eq!(decode(Some(&Value::Null)), Decoded::Invalid);
    }

    #[test]
    fn test_decode_any_value_yields_complete_record() {
        let values = vec![
            json!(42),
            json!("settings"),
            json!([1, 2, 3]),
            json!({}),
            json!({"apiKey": 7}),
            json!({"theme": "purple"}),
            json!({"apiKey": "k", "address": "a", "closeTabsOnBulkSave": null}),
            full_record(),
        ];

        for raw in values {
            let config = decode(Some(&raw)).into_configuration();
            let value = config.to_value().unwrap();
            for key in [
                "apiKey",
                "address",
                "autoSave",
                "closeTabsOnBulkSave",
                "theme",
                "showCountBadge",
                "useBadgeCache",
                "badgeCacheExpireMs",
                "customHeaders",
            ] {
                assert!(value.get(key).is_some(), "{} missing after decoding {}", key, raw);
            }
        }
    }

    #[test]
    fn test_null_later_field_is_backfilled() {
        let raw = json!({"apiKey": "k", "address": "a", "closeTabsOnBulkSave": null});

        let decoded = decode(Some(&raw));

        assert!(matches!(decoded, Decoded::Backfilled(_)));
        assert!(!decoded.into_configuration().close_tabs_on_bulk_save);
    }
}
