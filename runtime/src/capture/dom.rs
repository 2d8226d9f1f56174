//! Token extraction from full-document scan results.

use std::sync::OnceLock;

use anyhow::{bail, Result};
use blobtap::looks_like_token;
use regex::Regex;
use serde_json::Value;

static CSS_URL_RE: OnceLock<Regex> = OnceLock::new();

fn css_url_re() -> &'static Regex {
    CSS_URL_RE.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*['"]?(data:[^'")\s]+)"#).expect("css url regex is valid")
    })
}

/// What one document scan turned up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Tokens in document order. May contain repeats; the dispatcher dedups.
    pub tokens: Vec<String>,
    /// Number of elements in the document when it was scanned.
    pub elements: usize,
}

/// Tokens carried by one attribute value or stylesheet rule.
///
/// A value that is itself a token yields exactly that token. Otherwise every
/// `url(data:...)` reference inside it is extracted.
pub fn extract_tokens(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if looks_like_token(trimmed) {
        return vec![trimmed.to_string()];
    }
    css_url_re()
        .captures_iter(value)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|token| looks_like_token(token))
        .collect()
}

/// Interpret the value returned by the document scan script.
pub fn parse_scan_result(value: &Value) -> Result<ScanReport> {
    let Some(values) = value.get("values").and_then(Value::as_array) else {
        bail!("scan result has no values array");
    };
    let elements = value
        .get("elements")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;

    let tokens = values
        .iter()
        .filter_map(Value::as_str)
        .flat_map(extract_tokens)
        .collect();

    Ok(ScanReport { tokens, elements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_whole_value_token() {
        assert_eq!(
            extract_tokens("data:image/png;base64,AAAA"),
            vec!["data:image/png;base64,AAAA"]
        );
    }

    #[test]
    fn test_css_background_references() {
        let style = r#"background: url("data:image/gif;base64,R0lG") no-repeat, url(data:image/png;base64,iVBO);"#;
        assert_eq!(
            extract_tokens(style),
            vec!["data:image/gif;base64,R0lG", "data:image/png;base64,iVBO"]
        );
    }

    #[test]
    fn test_non_base64_data_url_ignored() {
        assert!(extract_tokens("data:text/plain,hello").is_empty());
        assert!(extract_tokens("url(data:image/svg+xml;utf8,<svg/>)").is_empty());
        assert!(extract_tokens("https://example.com/a.png").is_empty());
    }

    #[test]
    fn test_parse_scan_result() {
        let raw = json!({
            "values": [
                "data:audio/mpeg;base64,SUQz",
                ".hero { background-image: url('data:image/png;base64,AAAA'); }",
                42,
                "plain"
            ],
            "elements": 17
        });
        let report = parse_scan_result(&raw).unwrap();
        assert_eq!(report.elements, 17);
        assert_eq!(
            report.tokens,
            vec!["data:audio/mpeg;base64,SUQz", "data:image/png;base64,AAAA"]
        );
    }

    #[test]
    fn test_parse_scan_result_rejects_wrong_shape() {
        assert!(parse_scan_result(&json!(null)).is_err());
        assert!(parse_scan_result(&json!({ "elements": 3 })).is_err());
    }
}
