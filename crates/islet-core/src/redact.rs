//! Redaction of sensitive material before anything reaches a log.
//!
//! Two rules, applied recursively over structured values:
//! - any key whose lowercase form contains a sensitive substring has its
//!   value replaced with [`REDACTED`]
//! - URL-shaped strings have their query string replaced with `?<redacted>`
//!
//! Both passes are idempotent: `redact(redact(x)) == redact(x)`.

use serde_json::Value;

/// Placeholder written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Substrings that mark a key as sensitive (case-insensitive).
const SENSITIVE_KEY_PARTS: &[&str] = &[
    "password",
    "token",
    "api_key",
    "apikey",
    "secret",
    "credential",
    "authorization",
];

/// Whether a key names sensitive material.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| lower.contains(part))
}

/// Replace the query string of a URL with `?<redacted>`.
///
/// Non-URL strings and URLs without a query are returned unchanged, so the
/// pass is idempotent.
#[must_use]
pub fn redact_url(url: &str) -> String {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return url.to_string();
    }
    match url.split_once('?') {
        Some((base, _query)) => format!("{base}?<redacted>"),
        None => url.to_string(),
    }
}

/// Recursively redact a JSON value in place.
///
/// Sensitive keys have their values replaced wholesale; string values that
/// look like URLs have their query strings stripped.
pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *entry = Value::String(REDACTED.to_string());
                } else {
                    redact_value(entry);
                }
            }
        },
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item);
            }
        },
        Value::String(s) => {
            if s.starts_with("http://") || s.starts_with("https://") {
                *s = redact_url(s);
            }
        },
        _ => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_key_detection() {
        assert!(is_sensitive_key("password"));
        assert!(is_sensitive_key("API_KEY"));
        assert!(is_sensitive_key("github_token"));
        assert!(is_sensitive_key("Authorization"));
        assert!(is_sensitive_key("client_secret"));
        assert!(!is_sensitive_key("username"));
        assert!(!is_sensitive_key("url"));
    }

    #[test]
    fn test_redact_nested_object() {
        let mut value = json!({
            "user": "alice",
            "api_key": "sk-12345",
            "nested": {
                "refresh_token": "abc",
                "count": 3
            }
        });
        redact_value(&mut value);
        assert_eq!(value["user"], "alice");
        assert_eq!(value["api_key"], REDACTED);
        assert_eq!(value["nested"]["refresh_token"], REDACTED);
        assert_eq!(value["nested"]["count"], 3);
    }

    #[test]
    fn test_redact_url_query() {
        assert_eq!(
            redact_url("https://api.example.com/v1?key=abc&user=1"),
            "https://api.example.com/v1?<redacted>"
        );
        assert_eq!(
            redact_url("https://api.example.com/v1"),
            "https://api.example.com/v1"
        );
        assert_eq!(redact_url("not a url"), "not a url");
    }

    #[test]
    fn test_redaction_idempotent() {
        let mut once = json!({
            "token": "t",
            "endpoint": "https://example.com/x?a=1",
            "list": [{"secret_value": "s"}]
        });
        redact_value(&mut once);
        let mut twice = once.clone();
        redact_value(&mut twice);
        assert_eq!(once, twice);
    }
}
