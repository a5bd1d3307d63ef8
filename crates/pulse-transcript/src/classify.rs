use serde_json::Value;

use crate::types::{Step, ToolResult};

/// Decides whether a tool result represents a failure.
///
/// Ordered checks, first match wins: the explicit error flag, then a
/// structured-preview error indicator, then a raw substring match. The
/// substring tier is deliberate: previews are truncated and often stop being
/// valid JSON before the parse completes.
pub fn is_error_result(result: &ToolResult) -> bool {
    if result.is_error {
        return true;
    }

    let preview = result.preview.as_str();
    match serde_json::from_str::<Value>(preview) {
        Ok(parsed) => {
            if parsed.get("status").and_then(Value::as_str) == Some("error") {
                return true;
            }
            match parsed.get("error") {
                Some(Value::Null) | None => false,
                Some(Value::String(text)) => !text.is_empty(),
                Some(Value::Bool(flag)) => *flag,
                Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0) != 0.0,
                Some(_) => true,
            }
        }
        Err(_) => {
            preview.contains("\"status\": \"error\"") || preview.contains("\"status\":\"error\"")
        }
    }
}

/// True when any tool result of the step classifies as an error.
pub fn step_has_error(step: &Step) -> bool {
    step.tool_results.iter().any(is_error_result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(preview: &str, is_error: bool) -> ToolResult {
        ToolResult {
            name: "browser".to_string(),
            call_id: "c1".to_string(),
            size: preview.len(),
            preview: preview.to_string(),
            is_error,
        }
    }

    #[test]
    fn explicit_flag_wins() {
        assert!(is_error_result(&result("all good", true)));
    }

    #[test]
    fn structured_error_status_detected() {
        assert!(is_error_result(&result(r#"{"status":"error"}"#, false)));
        assert!(is_error_result(&result(
            r#"{"error":"timeout waiting for selector"}"#,
            false
        )));
        assert!(!is_error_result(&result(r#"{"status":"ok"}"#, false)));
        assert!(!is_error_result(&result(r#"{"error":""}"#, false)));
        assert!(!is_error_result(&result(r#"{"error":null}"#, false)));
    }

    #[test]
    fn truncated_preview_falls_back_to_substring() {
        // Valid JSON prefix cut mid-way: not parseable, substring still hits.
        let truncated = r#"{"status": "error", "message": "something went"#;
        assert!(is_error_result(&result(truncated, false)));
        assert!(!is_error_result(&result("plain text output", false)));
    }

    #[test]
    fn classifier_is_deterministic() {
        let sample = result(r#"{"status":"error"}"#, false);
        assert_eq!(is_error_result(&sample), is_error_result(&sample));
    }
}
