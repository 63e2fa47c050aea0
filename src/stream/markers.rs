use crate::scope::create_scope_id;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Creates the client-side push queue if the page does not have it yet.
pub const PREAMBLE: &str = "<script>!window.mbxM && (window.mbxM = []);</script>";

const PUSH_OPEN: &str = "<script>window.mbxM.push(";
const PUSH_CLOSE: &str = ");</script>";

static PUSH_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<script>window\.mbxM\.push\((?P<json>.*?)\);</script>").expect("valid push regex")
});

/// Script pushing `state` to the client, `None` when there is nothing to push.
///
/// `<` is escaped so store content cannot close the script element early.
pub fn state_script(state: &Map<String, Value>) -> Option<String> {
    if state.is_empty() {
        return None;
    }
    let json = match serde_json::to_string(state) {
        Ok(json) => json,
        Err(error) => {
            tracing::error!(%error, "failed to serialize streamed state");
            return None;
        }
    };
    Some(format!("{PUSH_OPEN}{}{PUSH_CLOSE}", json.replace('<', "\\u003c")))
}

/// Marker emitted inside a suspense fallback, telling the stream which scope
/// prefix and how many child scopes belong to the boundary.
pub fn suspense_fallback_marker(scope_prefix: &str, count: usize) -> String {
    format!(r#"<script data-context-id="{scope_prefix}" data-count="{count}"></script>"#)
}

/// Scope id of the `index`-th child of a suspense boundary.
pub fn suspense_child_scope(scope_prefix: &str, index: usize) -> String {
    format!("{}{index}", create_scope_id(scope_prefix))
}

/// JSON payloads of every push script in `html`. Malformed payloads are
/// skipped.
pub fn extract_payloads(html: &str) -> Vec<Map<String, Value>> {
    PUSH_PAYLOAD
        .captures_iter(html)
        .filter_map(|captures| {
            let json = captures.name("json")?.as_str();
            match serde_json::from_str::<Map<String, Value>>(json) {
                Ok(payload) => Some(payload),
                Err(error) => {
                    tracing::warn!(%error, "malformed state payload skipped");
                    None
                }
            }
        })
        .collect()
}
