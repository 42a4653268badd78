use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Interface languages with a translation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    En,
    #[serde(rename = "zh-CN")]
    ZhCn,
    #[serde(rename = "zh-TW")]
    ZhTw,
    #[serde(rename = "ja")]
    Ja,
    #[serde(rename = "es")]
    Es,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::En,
        Language::ZhCn,
        Language::ZhTw,
        Language::Ja,
        Language::Es,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::ZhCn => "zh-CN",
            Language::ZhTw => "zh-TW",
            Language::Ja => "ja",
            Language::Es => "es",
        }
    }

    /// Pick the closest supported language for a browser locale tag.
    pub fn from_locale(locale: &str) -> Self {
        if let Some(exact) = Self::ALL.iter().find(|l| l.tag() == locale) {
            return *exact;
        }
        if locale.starts_with("zh") {
            if locale.contains("TW") || locale.contains("HK") {
                Language::ZhTw
            } else {
                Language::ZhCn
            }
        } else if locale.starts_with("ja") {
            Language::Ja
        } else if locale.starts_with("es") {
            Language::Es
        } else {
            Language::En
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Grid and page preferences, synced next to the dials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Tiles per row
    pub columns: u32,
    pub language: Language,
    /// Multiplier applied to tile icons
    pub icon_scale: f64,
    pub show_clock: bool,
    pub show_search: bool,
    /// Search engine id used by the search box
    pub search_engine: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            columns: 6,
            language: Language::ZhCn,
            icon_scale: 1.0,
            show_clock: true,
            show_search: true,
            search_engine: "google".to_string(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.columns == 0 {
            return Err(Error::InvalidRecord("columns must be at least 1".to_string()));
        }
        if !self.icon_scale.is_finite() || self.icon_scale <= 0.0 {
            return Err(Error::InvalidRecord(format!(
                "icon scale must be positive, got {}",
                self.icon_scale
            )));
        }
        Ok(())
    }

    /// Overlay a persisted settings object onto the defaults one field at
    /// a time.
    ///
    /// Fields that are missing, unknown, ill-typed or out of range keep
    /// their default, so settings written by an older version still
    /// produce a complete object.
    pub fn merged_over_defaults(stored: &Value) -> Self {
        let defaults = Settings::default();
        let Some(stored) = stored.as_object() else {
            if !stored.is_null() {
                tracing::warn!("Ignoring non-object settings value");
            }
            return defaults;
        };
        let Ok(Value::Object(mut merged)) = serde_json::to_value(&defaults) else {
            return defaults;
        };

        let known: Vec<String> = merged.keys().cloned().collect();
        for key in known {
            let Some(value) = stored.get(&key) else {
                continue;
            };
            let previous = merged.insert(key.clone(), value.clone());
            let accepted = serde_json::from_value::<Settings>(Value::Object(merged.clone()))
                .map(|s| s.validate().is_ok())
                .unwrap_or(false);
            if !accepted {
                tracing::warn!("Ignoring invalid stored setting '{}'", key);
                if let Some(previous) = previous {
                    merged.insert(key, previous);
                }
            }
        }

        serde_json::from_value(Value::Object(merged)).unwrap_or(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.columns, 6);
        assert_eq!(settings.language, Language::ZhCn);
        assert_eq!(settings.icon_scale, 1.0);
        assert!(settings.show_clock);
        assert_eq!(settings.search_engine, "google");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(value["iconScale"], json!(1.0));
        assert_eq!(value["language"], json!("zh-CN"));
        assert!(value.get("icon_scale").is_none());
    }

    #[test]
    fn test_merge_fills_missing_fields() {
        // Written before iconScale existed
        let stored = json!({"columns": 8, "language": "en"});
        let settings = Settings::merged_over_defaults(&stored);

        assert_eq!(settings.columns, 8);
        assert_eq!(settings.language, Language::En);
        assert_eq!(settings.icon_scale, Settings::default().icon_scale);
        assert!(settings.show_search);
    }

    #[test]
    fn test_merge_drops_invalid_fields_only() {
        let stored = json!({
            "columns": 0,
            "language": "klingon",
            "iconScale": 1.5,
            "showClock": "yes",
            "searchEngine": "bing"
        });
        let settings = Settings::merged_over_defaults(&stored);

        assert_eq!(settings.columns, 6);
        assert_eq!(settings.language, Language::ZhCn);
        assert_eq!(settings.icon_scale, 1.5);
        assert!(settings.show_clock);
        assert_eq!(settings.search_engine, "bing");
    }

    #[test]
    fn test_merge_ignores_unknown_fields() {
        let stored = json!({"columns": 4, "theme": "dark"});
        let settings = Settings::merged_over_defaults(&stored);
        assert_eq!(settings.columns, 4);
    }

    #[test]
    fn test_merge_non_object_yields_defaults() {
        assert_eq!(Settings::merged_over_defaults(&json!(null)), Settings::default());
        assert_eq!(Settings::merged_over_defaults(&json!([1, 2])), Settings::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.columns = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.icon_scale = 0.0;
        assert!(settings.validate().is_err());
        settings.icon_scale = f64::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_language_from_locale() {
        assert_eq!(Language::from_locale("ja"), Language::Ja);
        assert_eq!(Language::from_locale("zh-HK"), Language::ZhTw);
        assert_eq!(Language::from_locale("zh-TW"), Language::ZhTw);
        assert_eq!(Language::from_locale("zh-SG"), Language::ZhCn);
        assert_eq!(Language::from_locale("es-MX"), Language::Es);
        assert_eq!(Language::from_locale("fr-FR"), Language::En);
    }
}
