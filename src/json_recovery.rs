//! JSON recovery for noisy model output.
//!
//! Models wrap JSON in prose, code fences, or trailing commentary often enough
//! that parsing the raw response directly is a losing game. `extract_json` is
//! total: whatever text comes in, a syntactically valid JSON string comes out,
//! with `"{}"` as the floor. Callers never see a parse failure.

use serde_json::Value;

/// Extract a valid JSON string from arbitrary text.
///
/// - Empty or whitespace-only input yields `"{}"`.
/// - Input that already parses as JSON is returned unchanged, so clean
///   provider output survives byte-for-byte.
/// - Otherwise the text is scanned for the first balanced `{...}` span that
///   parses. Candidates that balance but fail to parse are skipped and the
///   scan continues from where it left off, so the result is the first
///   *valid* span, not the largest.
/// - If no candidate parses, `"{}"`.
pub fn extract_json(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "{}".to_string();
    }

    if serde_json::from_str::<Value>(trimmed).is_ok() {
        return trimmed.to_string();
    }

    if let Some(span) = first_valid_object(trimmed) {
        return span.to_string();
    }

    "{}".to_string()
}

/// Recover a JSON *object* from arbitrary text.
///
/// Like [`extract_json`] but parsed, and with non-object recoveries (a bare
/// array or scalar that happened to pass through) collapsed to an empty
/// object. Callers that need `data["keep"]`-style access use this.
pub fn recover_object(text: &str) -> Value {
    let recovered = extract_json(text);
    match serde_json::from_str::<Value>(&recovered) {
        Ok(v @ Value::Object(_)) => v,
        _ => Value::Object(serde_json::Map::new()),
    }
}

/// Scan for the first balanced brace-delimited span that parses as JSON.
///
/// Depth counter over `{`/`}`; the start of the outermost unmatched `{` is
/// remembered, and when depth returns to zero the captured span is validated
/// by an actual parse. A span that balances but does not parse is discarded
/// and scanning resumes after it.
fn first_valid_object(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start: Option<usize> = None;

    for (i, c) in s.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(begin) = start {
                            let candidate = &s[begin..i + c.len_utf8()];
                            if serde_json::from_str::<Value>(candidate).is_ok() {
                                return Some(candidate);
                            }
                        }
                        start = None;
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_input_yields_empty_object() {
        assert_eq!(extract_json(""), "{}");
        assert_eq!(extract_json("   \n\t "), "{}");
    }

    #[test]
    fn valid_json_passes_through_unchanged() {
        let input = r#"{"keep": [{"api_id": "svc-1", "reason": "matches goal"}]}"#;
        assert_eq!(extract_json(input), input);

        // Arrays are valid JSON too; pass-through applies to them as well.
        let arr = r#"[1, 2, 3]"#;
        assert_eq!(extract_json(arr), arr);
    }

    #[test]
    fn extracts_object_from_prose() {
        let input = "Sure! Here is the selection:\n{\"keep\": []}\nLet me know if you need more.";
        assert_eq!(extract_json(input), r#"{"keep": []}"#);
    }

    #[test]
    fn extracts_object_from_code_fence() {
        let input = "```json\n{\"ranked\": [{\"api_id\": \"a\", \"C\": 0.9}]}\n```";
        assert_eq!(extract_json(input), r#"{"ranked": [{"api_id": "a", "C": 0.9}]}"#);
    }

    #[test]
    fn skips_invalid_balanced_candidate() {
        // The first balanced span is not valid JSON; the scan must continue
        // and pick up the later valid one instead of giving up.
        let input = "{not json} trailing {\"ok\": true}";
        assert_eq!(extract_json(input), r#"{"ok": true}"#);
    }

    #[test]
    fn no_braces_yields_empty_object() {
        assert_eq!(extract_json("I could not produce a selection."), "{}");
    }

    #[test]
    fn unbalanced_braces_yield_empty_object() {
        assert_eq!(extract_json("{\"keep\": ["), "{}");
    }

    #[test]
    fn totality_always_parses() {
        let inputs = [
            "",
            "plain text",
            "{{{{",
            "}}}}",
            "{\"a\"}",
            "prefix {\"a\": 1} suffix",
            "{\"nested\": {\"b\": [1, 2]}}",
            "unicode {«} {\"x\": \"π\"}",
        ];
        for input in inputs {
            let out = extract_json(input);
            assert!(
                serde_json::from_str::<Value>(&out).is_ok(),
                "extract_json({input:?}) produced unparseable {out:?}"
            );
        }
    }

    #[test]
    fn recover_object_collapses_non_objects() {
        assert_eq!(recover_object("[1,2,3]"), json!({}));
        assert_eq!(recover_object("42"), json!({}));
        assert_eq!(recover_object("nothing here"), json!({}));
        assert_eq!(recover_object(r#"{"a": 1}"#), json!({"a": 1}));
    }
}
