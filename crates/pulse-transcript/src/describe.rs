use pulse_core::truncate_chars;
use serde_json::Value;

/// Breakdown label for a browser tool call: the request kind when the action
/// is a generic "act", otherwise the action name itself.
pub fn browser_label(arguments: &Value) -> String {
    let action = str_field(arguments, "action");
    if action == "act" {
        let kind = arguments
            .get("request")
            .map(|request| str_field(request, "kind"))
            .unwrap_or_default();
        if kind.is_empty() {
            action
        } else {
            kind
        }
    } else {
        action
    }
}

/// Compact one-line description of a tool call for summaries and exports.
pub fn describe_call(name: &str, arguments: &Value) -> String {
    match name {
        "browser" => describe_browser(arguments),
        "read" | "write" | "edit" => short_path(&first_path(arguments)),
        "glob" => str_field(arguments, "pattern"),
        "grep" => format!("/{}/", truncate_chars(&str_field(arguments, "pattern"), 28)),
        "bash" => {
            let command = str_field(arguments, "command");
            truncate_chars(&command.split_whitespace().collect::<Vec<_>>().join(" "), 50)
        }
        other => other.to_string(),
    }
}

fn describe_browser(arguments: &Value) -> String {
    let action = str_field(arguments, "action");
    let request = arguments.get("request").cloned().unwrap_or(Value::Null);
    match action.as_str() {
        "navigate" => {
            let url = str_field(arguments, "targetUrl");
            // Path component only when the URL parses; full string otherwise.
            let shown = url
                .split_once("://")
                .and_then(|(_, rest)| rest.find('/').map(|i| rest[i..].to_string()))
                .unwrap_or(url);
            format!("nav → {}", truncate_chars(&shown, 42))
        }
        "act" => {
            let kind = str_field(&request, "kind");
            match kind.as_str() {
                "evaluate" => format!("eval (fn {}c)", str_field(&request, "fn").chars().count()),
                "snapshot" => {
                    let selector = str_field(&request, "selector");
                    if selector.is_empty() {
                        "snapshot".to_string()
                    } else {
                        format!("snapshot [{}]", truncate_chars(&selector, 18))
                    }
                }
                "wait" => format!(
                    "wait {}ms",
                    request.get("timeMs").and_then(Value::as_u64).unwrap_or(0)
                ),
                "click" => format!("click {}", str_field(&request, "ref")),
                "type" => format!("type \"{}\"", truncate_chars(&str_field(&request, "text"), 22)),
                "press" => format!("press {}", str_field(&request, "key")),
                "scroll" => "scroll".to_string(),
                other => format!("act:{other}"),
            }
        }
        "tabs" => "tabs".to_string(),
        "open" => "open browser".to_string(),
        "close" => "close".to_string(),
        "" => "browser".to_string(),
        other => other.to_string(),
    }
}

fn first_path(arguments: &Value) -> String {
    let path = str_field(arguments, "file_path");
    if path.is_empty() {
        str_field(arguments, "path")
    } else {
        path
    }
}

/// Strips workspace and home prefixes from a path and caps its length.
pub fn short_path(path: &str) -> String {
    let stripped = path
        .rsplit_once("/workspace/")
        .map(|(_, rest)| rest.to_string())
        .or_else(|| {
            path.rsplit_once("/.pulse/")
                .map(|(_, rest)| format!("~/{rest}"))
        })
        .or_else(|| {
            path.strip_prefix("/Users/")
                .and_then(|rest| rest.split_once('/'))
                .map(|(_, rest)| format!("~/{rest}"))
        })
        .unwrap_or_else(|| path.to_string());
    truncate_chars(&stripped, 45)
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn browser_label_uses_kind_for_act() {
        assert_eq!(
            browser_label(&json!({"action": "act", "request": {"kind": "snapshot"}})),
            "snapshot"
        );
        assert_eq!(browser_label(&json!({"action": "navigate"})), "navigate");
        assert_eq!(browser_label(&json!({"action": "act"})), "act");
    }

    #[test]
    fn describe_call_covers_common_tools() {
        assert_eq!(
            describe_call("browser", &json!({"action": "navigate", "targetUrl": "https://example.com/pricing"})),
            "nav → /pricing"
        );
        assert_eq!(
            describe_call("browser", &json!({"action": "act", "request": {"kind": "wait", "timeMs": 250}})),
            "wait 250ms"
        );
        assert_eq!(describe_call("grep", &json!({"pattern": "foo.*bar"})), "/foo.*bar/");
        assert_eq!(
            describe_call("bash", &json!({"command": "ls   -la\n/tmp"})),
            "ls -la /tmp"
        );
        assert_eq!(describe_call("notion", &json!({})), "notion");
    }

    #[test]
    fn short_path_strips_known_prefixes() {
        assert_eq!(short_path("/Users/sam/projects/demo/src/main.rs"), "~/projects/demo/src/main.rs");
        assert_eq!(short_path("/srv/workspace/site/index.html"), "site/index.html");
    }
}
