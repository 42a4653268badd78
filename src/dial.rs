//! Shortcut records and their validation.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One tile on the speed dial grid.
///
/// Identity is positional; there is no id field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dial {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub icon: String,
}

impl Dial {
    /// Build a validated dial from user input.
    ///
    /// Inputs are trimmed and a bare host gets an `https://` prefix.
    pub fn new(name: &str, url: &str, icon: &str) -> Result<Self> {
        let dial = Self {
            name: name.trim().to_string(),
            url: normalize_url(url),
            icon: icon.trim().to_string(),
        };
        dial.validate()?;
        Ok(dial)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidRecord("name is empty".to_string()));
        }
        if self.url.trim().is_empty() {
            return Err(Error::InvalidRecord(format!("'{}' has no url", self.name)));
        }
        if !has_web_scheme(&self.url) {
            return Err(Error::InvalidRecord(format!(
                "'{}' url must start with http:// or https://",
                self.name
            )));
        }
        if web_host(&self.url).is_empty() {
            return Err(Error::InvalidRecord(format!("'{}' url has no host", self.name)));
        }
        if !self.icon.is_empty() && !is_valid_svg(&self.icon) {
            return Err(Error::InvalidRecord(format!(
                "'{}' icon is not a self-contained <svg> document",
                self.name
            )));
        }
        Ok(())
    }

    /// Drop an icon that no longer passes validation.
    ///
    /// Returns true if the icon was cleared.
    pub(crate) fn scrub_icon(&mut self) -> bool {
        if !self.icon.is_empty() && !is_valid_svg(&self.icon) {
            self.icon.clear();
            return true;
        }
        false
    }
}

/// The tiles shown before the user has saved anything.
pub fn default_dials() -> Vec<Dial> {
    [
        ("Google", "https://www.google.com"),
        ("YouTube", "https://www.youtube.com"),
        ("GitHub", "https://www.github.com"),
        ("Twitter", "https://www.twitter.com"),
    ]
    .into_iter()
    .map(|(name, url)| Dial {
        name: name.to_string(),
        url: url.to_string(),
        icon: String::new(),
    })
    .collect()
}

fn has_web_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Everything after the scheme.
fn web_host(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or_default()
        .trim()
}

fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || has_web_scheme(url) {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn dangerous_markup() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)<script|\bon\w+\s*=").expect("static pattern compiles")
    })
}

/// Accept only an inline `<svg>…</svg>` fragment with no scripts or
/// inline event handlers.
pub fn is_valid_svg(markup: &str) -> bool {
    let trimmed = markup.trim();
    if !trimmed.starts_with("<svg") || !trimmed.ends_with("</svg>") {
        return false;
    }
    !dangerous_markup().is_match(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CIRCLE: &str =
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><circle cx="12" cy="12" r="10"/></svg>"#;

    #[test]
    fn test_new_trims_and_prefixes_scheme() {
        let dial = Dial::new("  Docs ", "docs.rs", "").unwrap();
        assert_eq!(dial.name, "Docs");
        assert_eq!(dial.url, "https://docs.rs");
        assert!(dial.icon.is_empty());
    }

    #[test]
    fn test_new_keeps_http_scheme() {
        let dial = Dial::new("Local", "http://intranet.example", "").unwrap();
        assert_eq!(dial.url, "http://intranet.example");
    }

    #[test]
    fn test_empty_name_or_url_rejected() {
        assert!(matches!(Dial::new("", "https://x.example", ""), Err(Error::InvalidRecord(_))));
        assert!(matches!(Dial::new("Site", "   ", ""), Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_scheme_without_host_rejected() {
        for url in ["https://", "http://", "https://   "] {
            assert!(
                matches!(Dial::new("Site", url, ""), Err(Error::InvalidRecord(_))),
                "expected {url:?} to be rejected"
            );
        }
        assert!(Dial::new("Site", "https://a", "").is_ok());
    }

    #[test]
    fn test_valid_svg_icon_accepted() {
        let dial = Dial::new("Circle", "https://x.example", CIRCLE).unwrap();
        assert_eq!(dial.icon, CIRCLE);
    }

    #[test]
    fn test_svg_validator_rejects_non_svg() {
        assert!(!is_valid_svg("<img src=x>"));
        assert!(!is_valid_svg("<svg><circle/>"));
        assert!(!is_valid_svg("https://example.com/icon.png"));
    }

    #[test]
    fn test_svg_validator_rejects_scripts_and_handlers() {
        assert!(!is_valid_svg("<svg><script>alert(1)</script></svg>"));
        assert!(!is_valid_svg("<svg><SCRIPT>alert(1)</SCRIPT></svg>"));
        assert!(!is_valid_svg(r#"<svg onload="alert(1)"></svg>"#));
        assert!(!is_valid_svg(r#"<svg><rect onClick = "x()"/></svg>"#));
    }

    #[test]
    fn test_svg_validator_allows_attributes_containing_on() {
        assert!(is_valid_svg(r#"<svg version="1.1"><text content="x">on</text></svg>"#));
    }

    #[test]
    fn test_invalid_icon_rejected() {
        let result = Dial::new("Bad", "https://x.example", "<svg onload=\"x()\"></svg>");
        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_scrub_icon_clears_invalid_markup() {
        let mut dial = Dial {
            name: "Old".to_string(),
            url: "https://old.example".to_string(),
            icon: "<b>not svg</b>".to_string(),
        };
        assert!(dial.scrub_icon());
        assert!(dial.icon.is_empty());
        assert!(!dial.scrub_icon());
    }

    #[test]
    fn test_missing_icon_field_deserializes_empty() {
        let dial: Dial = serde_json::from_str(r#"{"name":"A","url":"https://a.example"}"#).unwrap();
        assert!(dial.icon.is_empty());
    }

    #[test]
    fn test_default_dials_are_valid() {
        let dials = default_dials();
        assert_eq!(dials.len(), 4);
        assert_eq!(dials[0].name, "Google");
        assert!(dials.iter().all(|d| d.validate().is_ok()));
    }
}
