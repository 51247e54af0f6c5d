use crate::errors::Result;

/// Dispatches `input` and `change` so page scripts see programmatic edits.
pub const FIRE_CHANGE: &str = "el.dispatchEvent(new Event('input', { bubbles: true })); \
     el.dispatchEvent(new Event('change', { bubbles: true }));";

pub const IS_VISIBLE: &str = "var r = el.getBoundingClientRect(); \
     var s = window.getComputedStyle(el); \
     return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';";

/// Wraps `body` in a function with `el` bound to the element at `css_path`;
/// a missing element throws so the evaluation fails. The result comes back
/// JSON-encoded, since arrays and objects are not returned by value.
pub fn on_element(css_path: &str, body: &str) -> Result<String> {
    let selector = serde_json::to_string(css_path)?;
    Ok(format!(
        r#"JSON.stringify((function() {{
    var el = document.querySelector({selector});
    if (!el) {{ throw new Error('no element at ' + {selector}); }}
    {body}
}})())"#
    ))
}

/// Returns the token already stamped on `window`, stamping `fresh` when the
/// document has none.
pub fn stamp_token(fresh: &str) -> String {
    let fresh = serde_json::Value::String(fresh.to_string());
    format!(
        "(function() {{ if (!window.__fluentBrowserToken) {{ window.__fluentBrowserToken = {}; }} return window.__fluentBrowserToken; }})()",
        fresh
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors_are_escaped() {
        let script = on_element("input[name=\"q\"]", "return el.value;").unwrap();
        assert!(script.contains(r#"document.querySelector("input[name=\"q\"]")"#));
        assert!(script.contains("return el.value;"));
        assert!(script.starts_with("JSON.stringify("));
    }

    #[test]
    fn test_token_script_embeds_fresh_value() {
        let script = stamp_token("abc'def");
        assert!(script.contains("window.__fluentBrowserToken = \"abc'def\""));
    }

    #[test]
    fn test_visibility_check_reads_computed_style() {
        let script = on_element("#banner", IS_VISIBLE).unwrap();
        assert!(script.contains("getComputedStyle"));
        assert!(script.contains("getBoundingClientRect"));
    }
}
