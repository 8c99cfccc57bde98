//! JSON response envelopes.
//!
//! ```text
//! {"ok": true}                                         # import, backup, restore
//! {"ok": true, "headers": [..], "rows": [..], "took": 0.001}   # run_query
//! {"ok": true, "data": {..}}                           # export
//! {"ok": false, "kind": "ScriptError", "message": ".."}
//! ```

use crate::error::FfiError;
use quarry_core::NamedRows;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

/// Success without payload.
pub fn ok() -> String {
    json!({"ok": true}).to_string()
}

/// Query result with the elapsed time in seconds.
pub fn rows(result: &NamedRows, took: Duration) -> String {
    json!({
        "ok": true,
        "headers": result.headers,
        "rows": result.rows_json(),
        "took": took.as_secs_f64(),
    })
    .to_string()
}

/// Success carrying a data object.
pub fn data(data: JsonValue) -> String {
    json!({"ok": true, "data": data}).to_string()
}

/// Failure with its taxonomy kind and message.
pub fn failure(err: &FfiError) -> String {
    json!({
        "ok": false,
        "kind": err.kind_name(),
        "message": err.to_string(),
    })
    .to_string()
}
