//! Helpers for driving the C entry points from Rust.

#![allow(dead_code)]

use quarry_ffi::{
    quarry_backup, quarry_export_relations, quarry_free_str, quarry_import_from_backup,
    quarry_import_relations, quarry_open_db, quarry_restore, quarry_run_query,
};
use serde_json::Value as JsonValue;
use std::ffi::{c_char, CStr, CString};

pub fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

/// Copies a returned string and frees it.
pub fn take(ptr: *mut c_char) -> String {
    assert!(!ptr.is_null(), "entry point returned null");
    let text = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
    unsafe { quarry_free_str(ptr) };
    text
}

pub fn envelope(ptr: *mut c_char) -> JsonValue {
    serde_json::from_str(&take(ptr)).unwrap()
}

pub fn open(engine: &str, path: &str, options: &str) -> Result<i32, String> {
    let (engine, path, options) = (c(engine), c(path), c(options));
    let mut id = -1;
    let err = unsafe { quarry_open_db(engine.as_ptr(), path.as_ptr(), options.as_ptr(), &mut id) };
    if err.is_null() {
        Ok(id)
    } else {
        Err(take(err))
    }
}

pub fn open_mem() -> i32 {
    open("mem", "", "{}").unwrap()
}

pub fn query(id: i32, script: &str, params: &str, readonly: bool) -> JsonValue {
    let (script, params) = (c(script), c(params));
    envelope(unsafe { quarry_run_query(id, script.as_ptr(), params.as_ptr(), readonly) })
}

pub fn import(id: i32, payload: &str) -> JsonValue {
    let payload = c(payload);
    envelope(unsafe { quarry_import_relations(id, payload.as_ptr()) })
}

pub fn export(id: i32, payload: &str) -> JsonValue {
    let payload = c(payload);
    envelope(unsafe { quarry_export_relations(id, payload.as_ptr()) })
}

pub fn backup(id: i32, path: &str) -> JsonValue {
    let path = c(path);
    envelope(unsafe { quarry_backup(id, path.as_ptr()) })
}

pub fn restore(id: i32, path: &str) -> JsonValue {
    let path = c(path);
    envelope(unsafe { quarry_restore(id, path.as_ptr()) })
}

pub fn import_from_backup(id: i32, payload: &str) -> JsonValue {
    let payload = c(payload);
    envelope(unsafe { quarry_import_from_backup(id, payload.as_ptr()) })
}

/// Exports every stored relation, as listed by `::relations`.
pub fn export_all(id: i32) -> JsonValue {
    let listed = query(id, "::relations", "{}", true);
    assert_eq!(listed["ok"], true, "{listed}");
    let names: Vec<JsonValue> = listed["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row[0].clone())
        .collect();
    let payload = serde_json::json!({ "relations": names });
    let exported = export(id, &payload.to_string());
    assert_eq!(exported["ok"], true, "{exported}");
    exported["data"].clone()
}

pub fn is_failure(env: &JsonValue, kind: &str) -> bool {
    env["ok"] == false && env["kind"] == kind && env["message"].is_string()
}
