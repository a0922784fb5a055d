//! Tolerant JSON extraction/repair for LM responses.
//!
//! Ports `original_source/Backend/services/gemini_service.py:_parse_json_response`
//! step for step: fenced-code extraction, brace-slicing, comment/trailing-comma
//! stripping, then a last-resort raw-newline escape. Returns `None` (never an
//! error) on total failure — callers substitute a fallback per spec §4.4/§7.

use regex::Regex;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());
static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)//.*$").unwrap());
static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*[\]}])").unwrap());

/// Extract and parse a JSON object out of a raw LM response, repairing
/// common malformations along the way.
pub fn repair_json(text: &str) -> Option<serde_json::Value> {
    let candidate = extract_candidate(text);

    if let Ok(value) = serde_json::from_str(&candidate) {
        return Some(value);
    }

    let stripped = strip_comments_and_trailing_commas(&candidate);
    if let Ok(value) = serde_json::from_str(&stripped) {
        return Some(value);
    }

    let newline_escaped = escape_raw_newlines_in_strings(&stripped);
    serde_json::from_str(&newline_escaped).ok()
}

fn extract_candidate(text: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(text) {
        return caps[1].to_string();
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end >= start => text[start..=end].to_string(),
        _ => text.to_string(),
    }
}

fn strip_comments_and_trailing_commas(json_str: &str) -> String {
    let no_line_comments = LINE_COMMENT.replace_all(json_str, "");
    let no_block_comments = BLOCK_COMMENT.replace_all(&no_line_comments, "");
    TRAILING_COMMA
        .replace_all(&no_block_comments, "$1")
        .into_owned()
}

/// Escape bare `\n` characters that sit between a word/quote character on
/// both sides — LLMs frequently emit literal newlines inside JSON string
/// values, which is invalid JSON. `regex` has no lookaround, so this walks
/// the string manually rather than porting the Python lookbehind/lookahead
/// regex verbatim.
fn escape_raw_newlines_in_strings(json_str: &str) -> String {
    let chars: Vec<char> = json_str.chars().collect();
    let mut out = String::with_capacity(json_str.len());
    let is_word_or_quote = |c: char| c.is_alphanumeric() || c == '_' || c == '"';

    for (i, &c) in chars.iter().enumerate() {
        if c == '\n' {
            let prev_ok = i > 0 && is_word_or_quote(chars[i - 1]);
            let next_ok = i + 1 < chars.len() && is_word_or_quote(chars[i + 1]);
            if prev_ok && next_ok {
                out.push_str("\\n");
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_direct_json() {
        let value = repair_json(r#"{"a": 1, "b": "two"}"#).unwrap();
        assert_eq!(value, json!({"a": 1, "b": "two"}));
    }

    #[test]
    fn extracts_from_fenced_code_block() {
        let text = "Sure, here you go:\n```json\n{\"a\": 1}\n```\nhope that helps";
        let value = repair_json(text).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn extracts_from_first_and_last_brace_without_fence() {
        let text = "preamble {\"a\": 1} trailing junk";
        let value = repair_json(text).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn strips_trailing_commas() {
        let value = repair_json(r#"{"a": [1, 2, 3,], "b": 2,}"#).unwrap();
        assert_eq!(value, json!({"a": [1, 2, 3], "b": 2}));
    }

    #[test]
    fn strips_line_and_block_comments() {
        let text = r#"{
            // a line comment
            "a": 1, /* a block
            comment */ "b": 2
        }"#;
        let value = repair_json(text).unwrap();
        assert_eq!(value, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn escapes_raw_newlines_between_word_characters() {
        let text = "{\"a\": \"line one\nline two\"}";
        let value = repair_json(text).unwrap();
        assert_eq!(value["a"], "line one\nline two");
    }

    #[test]
    fn total_failure_returns_none() {
        assert!(repair_json("not json at all, no braces").is_none());
    }

    #[test]
    fn empty_object_is_not_none() {
        assert_eq!(repair_json("{}").unwrap(), json!({}));
    }
}
