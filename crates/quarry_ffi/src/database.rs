//! Database FFI functions.

use crate::dispatch;
use crate::error::FfiError;
use crate::strings::{into_c_string, str_from_ptr};
use std::ffi::c_char;
use tracing::warn;

/// Opens a database.
///
/// # Arguments
///
/// * `engine` - Engine kind, `"mem"` or `"file"`
/// * `path` - Storage path (ignored by `"mem"`)
/// * `options` - Engine options as a JSON object; empty means `{}`
/// * `db_id` - Output pointer for the handle id
///
/// # Returns
///
/// Null on success. On failure, an error message the caller must free with
/// `quarry_free_str`; `*db_id` is left untouched.
///
/// # Safety
///
/// - `engine`, `path` and `options` must be null or valid null-terminated strings
/// - `db_id` must be null or a valid, writable pointer
#[no_mangle]
pub unsafe extern "C" fn quarry_open_db(
    engine: *const c_char,
    path: *const c_char,
    options: *const c_char,
    db_id: *mut i32,
) -> *mut c_char {
    let result = dispatch::guard(|| {
        if db_id.is_null() {
            return Err(FfiError::encoding("db_id", "null pointer"));
        }
        let engine = str_from_ptr(engine, "engine")?;
        let path = str_from_ptr(path, "path")?;
        let options = str_from_ptr(options, "options")?;
        dispatch::open_db(engine, path, options)
    });
    match result {
        Ok(id) => {
            *db_id = id;
            std::ptr::null_mut()
        }
        Err(e) => {
            warn!(kind = e.kind_name(), error = %e, "open failed");
            into_c_string(e.to_string())
        }
    }
}

/// Closes a database.
///
/// Returns true if the handle was open. Calls already running against the
/// handle finish normally. Nothing is allocated.
#[no_mangle]
pub extern "C" fn quarry_close_db(db_id: i32) -> bool {
    dispatch::close_db(db_id)
}

/// Runs a script.
///
/// Returns a JSON envelope that must be freed with `quarry_free_str`. With
/// `immutable_query` set, scripts that write fail with `ok:false`.
///
/// # Safety
///
/// `script` and `params` must be null or valid null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn quarry_run_query(
    db_id: i32,
    script: *const c_char,
    params: *const c_char,
    immutable_query: bool,
) -> *mut c_char {
    into_c_string(dispatch::respond("run_query", db_id, || {
        let script = str_from_ptr(script, "script")?;
        let params = str_from_ptr(params, "params")?;
        dispatch::run_query(db_id, script, params, immutable_query)
    }))
}

/// Imports relations from a JSON payload. Triggers do not run.
///
/// Returns a JSON envelope that must be freed with `quarry_free_str`.
///
/// # Safety
///
/// `payload` must be null or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn quarry_import_relations(
    db_id: i32,
    payload: *const c_char,
) -> *mut c_char {
    into_c_string(dispatch::respond("import_relations", db_id, || {
        dispatch::import_relations(db_id, str_from_ptr(payload, "payload")?)
    }))
}

/// Exports relations named by `{"relations": [...]}`.
///
/// Returns a JSON envelope that must be freed with `quarry_free_str`.
///
/// # Safety
///
/// `payload` must be null or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn quarry_export_relations(
    db_id: i32,
    payload: *const c_char,
) -> *mut c_char {
    into_c_string(dispatch::respond("export_relations", db_id, || {
        dispatch::export_relations(db_id, str_from_ptr(payload, "payload")?)
    }))
}

/// Writes a backup of the database to `out_path`.
///
/// Returns a JSON envelope that must be freed with `quarry_free_str`.
///
/// # Safety
///
/// `out_path` must be null or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn quarry_backup(db_id: i32, out_path: *const c_char) -> *mut c_char {
    into_c_string(dispatch::respond("backup", db_id, || {
        dispatch::backup(db_id, str_from_ptr(out_path, "path")?)
    }))
}

/// Restores a backup into an empty database.
///
/// Returns a JSON envelope that must be freed with `quarry_free_str`.
///
/// # Safety
///
/// `in_path` must be null or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn quarry_restore(db_id: i32, in_path: *const c_char) -> *mut c_char {
    into_c_string(dispatch::respond("restore", db_id, || {
        dispatch::restore(db_id, str_from_ptr(in_path, "path")?)
    }))
}

/// Imports relations from a backup: `{"path": ..., "relations": [...]}`.
/// Triggers do not run.
///
/// Returns a JSON envelope that must be freed with `quarry_free_str`.
///
/// # Safety
///
/// `payload` must be null or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn quarry_import_from_backup(
    db_id: i32,
    payload: *const c_char,
) -> *mut c_char {
    into_c_string(dispatch::respond("import_from_backup", db_id, || {
        dispatch::import_from_backup(db_id, str_from_ptr(payload, "payload")?)
    }))
}

/// Returns the library version as a null-terminated string.
///
/// The returned pointer is static and must not be freed.
#[no_mangle]
pub extern "C" fn quarry_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr().cast()
}
