//! Decodes provider stream lines into text deltas
//!
//! OpenAI-compatible chunks look like:
//! ```text
//! data: {"id":"chatcmpl-123","choices":[{"index":0,"delta":{"content":"Hello"}}]}
//! ```
//! Anything that does not carry `choices[0].delta.content` is skipped.

use serde_json::Value;
use tracing::trace;

/// Prefix tagging a payload line
pub const DATA_PREFIX: &str = "data: ";

/// Provider's end-of-stream marker; carries no content
pub const DONE_SENTINEL: &str = "[DONE]";

/// Extract the text delta carried by one logical line, if any
///
/// Never fails: non-data lines, the sentinel, undecodable payloads and
/// payloads without content all yield `None`. Invalid UTF-8 is replaced
/// with U+FFFD rather than dropping the line.
pub fn decode_line(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);

    let payload = line.strip_prefix(DATA_PREFIX)?;
    if payload == DONE_SENTINEL {
        return None;
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            trace!("Skipping malformed stream payload: {e}");
            return None;
        }
    };

    extract_delta_content(&value)
}

fn extract_delta_content(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|content| !content.is_empty())
        .map(|content| content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_content_delta() {
        let line = br#"data: {"id":"chatcmpl-123","choices":[{"index":0,"delta":{"content":"Hello"}}]}"#;
        assert_eq!(decode_line(line), Some("Hello".to_string()));
    }

    #[test]
    fn test_decode_preserves_whitespace() {
        let line = br#"data: {"choices":[{"delta":{"content":"  \n"}}]}"#;
        assert_eq!(decode_line(line), Some("  \n".to_string()));
    }

    #[test]
    fn test_role_only_delta_is_skipped() {
        let line = br#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(decode_line(line), None);
    }

    #[test]
    fn test_empty_content_is_skipped() {
        let line = br#"data: {"choices":[{"delta":{"content":""},"finish_reason":"stop"}]}"#;
        assert_eq!(decode_line(line), None);
    }

    #[test]
    fn test_null_content_is_skipped() {
        let line = br#"data: {"choices":[{"delta":{"content":null}}]}"#;
        assert_eq!(decode_line(line), None);
    }

    #[test]
    fn test_missing_intermediate_fields() {
        assert_eq!(decode_line(br#"data: {}"#), None);
        assert_eq!(decode_line(br#"data: {"choices":[]}"#), None);
        assert_eq!(decode_line(br#"data: {"choices":[{}]}"#), None);
        assert_eq!(decode_line(br#"data: {"choices":"oops"}"#), None);
        assert_eq!(decode_line(br#"data: [1,2,3]"#), None);
    }

    #[test]
    fn test_done_sentinel_is_skipped() {
        assert_eq!(decode_line(b"data: [DONE]"), None);
    }

    #[test]
    fn test_lines_without_prefix_are_ignored() {
        assert_eq!(decode_line(b""), None);
        assert_eq!(decode_line(b": keep-alive"), None);
        assert_eq!(decode_line(b"event: message"), None);
        assert_eq!(
            decode_line(br#"data:{"choices":[{"delta":{"content":"x"}}]}"#),
            None
        );
    }

    #[test]
    fn test_malformed_json_is_skipped() {
        assert_eq!(decode_line(br#"data: {"choices":[{"delta":"#), None);
        assert_eq!(decode_line(b"data: not json at all"), None);
    }

    #[test]
    fn test_invalid_utf8_payload_without_json_is_skipped() {
        assert_eq!(decode_line(b"data: \xff\xfe"), None);
    }

    #[test]
    fn test_invalid_utf8_in_content_is_replaced() {
        let line = b"data: {\"choices\":[{\"delta\":{\"content\":\"caf\xff\"}}]}";
        assert_eq!(decode_line(line), Some("caf\u{FFFD}".to_string()));
    }

    #[test]
    fn test_unicode_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Bon appétit 🍝"}}]}"#;
        assert_eq!(decode_line(line.as_bytes()), Some("Bon appétit 🍝".to_string()));
    }
}
