//! Classification of raw model output into loop directives.
//!
//! Models are instructed to answer with a JSON object, but real replies wrap
//! it in prose, markdown fences, or escape the tag field. The interpreter
//! digs the first well-formed object out of the text and classifies it;
//! anything unparseable degrades to echoing the text back.

use serde_json::Value;

/// What the orchestrator should do with a model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Terminal payload meant for direct display (`final_answer` or
    /// `function_call_result`).
    Final(Value),
    /// Request to invoke a named tool with positional arguments.
    ToolCall {
        function: String,
        arguments: Vec<Value>,
    },
    /// A JSON object that fits no known schema; surfaced unchanged.
    Fallback(Value),
    /// No embeddable JSON at all; the raw text is the message.
    Malformed(String),
}

const TERMINAL_KINDS: [&str; 2] = ["final_answer", "function_call_result"];

/// Locate the first well-formed JSON object embedded anywhere in `raw`,
/// tolerating surrounding prose.
pub fn extract_json(raw: &str) -> Option<Value> {
    let bytes = raw.as_bytes();
    let mut start = 0;
    while let Some(offset) = raw[start..].find('{') {
        let open = start + offset;
        if let Some(end) = balanced_end(bytes, open) {
            if let Ok(value) = serde_json::from_str::<Value>(&raw[open..=end]) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
        start = open + 1;
    }
    None
}

/// Byte index of the brace closing the object opened at `open`, honoring
/// string literals and escapes.
fn balanced_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (index, &byte) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Classify a raw model reply. Never fails: unparseable input becomes
/// `Malformed`, schema mismatches become `Fallback`.
pub fn interpret(raw: &str) -> Directive {
    let Some(object) = extract_json(raw) else {
        return Directive::Malformed(raw.to_string());
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .map(|tag| tag.replace('\\', ""));
    if let Some(kind) = kind {
        if TERMINAL_KINDS.contains(&kind.as_str()) {
            let result = object.get("result").cloned().unwrap_or(Value::Null);
            return Directive::Final(result);
        }
    }

    let function = object.get("function").and_then(Value::as_str);
    match function {
        Some(function) => {
            let arguments = object
                .get("arguments")
                .map(flatten_arguments)
                .unwrap_or_default();
            Directive::ToolCall {
                function: function.to_string(),
                arguments,
            }
        }
        None => Directive::Fallback(object),
    }
}

/// Normalize an argument payload to a positional list. Mappings are
/// flattened to their values in order; a scalar becomes a single argument.
pub fn flatten_arguments(arguments: &Value) -> Vec<Value> {
    match arguments {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map.values().cloned().collect(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn final_answer_result_returned_unchanged() {
        let raw = r#"{"type": "final_answer", "result": {"answer": [1, 2, 3]}}"#;
        assert_eq!(interpret(raw), Directive::Final(json!({"answer": [1, 2, 3]})));
    }

    #[test]
    fn function_call_result_is_terminal() {
        let raw = r#"{"type": "function_call_result", "result": "hi"}"#;
        assert_eq!(interpret(raw), Directive::Final(json!("hi")));
    }

    #[test]
    fn escaped_type_tag_still_classifies() {
        let raw = r#"{"type": "final\\_answer", "result": "done"}"#;
        assert_eq!(interpret(raw), Directive::Final(json!("done")));
    }

    #[test]
    fn object_extracted_from_surrounding_prose() {
        let raw = "Sure, calling the tool now:\n```json\n{\"type\": \"function_call\", \"function\": \"echo\", \"arguments\": [\"hi\"]}\n```\nDone.";
        assert_eq!(
            interpret(raw),
            Directive::ToolCall {
                function: "echo".into(),
                arguments: vec![json!("hi")],
            }
        );
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let raw = r#"note {"function": "echo", "arguments": ["a { b } c"]} trailing"#;
        assert_eq!(
            interpret(raw),
            Directive::ToolCall {
                function: "echo".into(),
                arguments: vec![json!("a { b } c")],
            }
        );
    }

    #[test]
    fn mapping_arguments_flatten_to_value_order() {
        let raw = r#"{"function": "search", "arguments": {"query": "rust", "limit": 3}}"#;
        assert_eq!(
            interpret(raw),
            Directive::ToolCall {
                function: "search".into(),
                arguments: vec![json!("rust"), json!(3)],
            }
        );
    }

    #[test]
    fn prose_without_json_is_malformed() {
        let raw = "I could not decide on a tool.";
        assert_eq!(interpret(raw), Directive::Malformed(raw.to_string()));

        // A bare array is not an object either.
        assert_eq!(
            interpret("[1, 2, 3]"),
            Directive::Malformed("[1, 2, 3]".to_string())
        );
    }

    #[test]
    fn unknown_object_shape_falls_back_unchanged() {
        let raw = r#"{"thought": "hmm"}"#;
        assert_eq!(interpret(raw), Directive::Fallback(json!({"thought": "hmm"})));
    }
}
