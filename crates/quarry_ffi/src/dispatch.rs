//! Safe Rust API behind the C entry points.
//!
//! Each operation validates its text arguments, resolves the handle in the
//! global [`Registry`], runs the engine on the calling thread and returns the
//! success envelope. Failures come back as [`FfiError`]; [`respond`] renders
//! them as `ok:false` envelopes and stops panics.

use crate::envelope;
use crate::error::{FfiError, FfiResult};
use crate::registry::Registry;
use crate::strings::check_text;
use quarry_core::ScriptMutability;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Runs `f`, turning a panic into [`FfiError::Panic`].
pub fn guard<T>(f: impl FnOnce() -> FfiResult<T>) -> FfiResult<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(FfiError::Panic(panic_message(payload.as_ref())))
    })
}

/// Runs an envelope-producing operation and renders any failure.
pub fn respond(op: &'static str, db_id: i32, f: impl FnOnce() -> FfiResult<String>) -> String {
    match guard(f) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(db_id, op, kind = e.kind_name(), error = %e, "operation failed");
            envelope::failure(&e)
        }
    }
}

/// Opens a database and returns its handle id.
pub fn open_db(engine: &str, path: &str, options: &str) -> FfiResult<i32> {
    check_text(engine, "engine")?;
    check_text(path, "path")?;
    check_text(options, "options")?;
    guard(|| Registry::global().open(engine, path, options))
}

/// Closes a handle. Returns false if it was not open.
pub fn close_db(db_id: i32) -> bool {
    // Only the engine's drop can panic here, and it runs after removal.
    guard(|| Ok(Registry::global().close(db_id))).unwrap_or(true)
}

/// Closes every open handle.
pub fn close_all() -> usize {
    guard(|| Ok(Registry::global().close_all())).unwrap_or(0)
}

/// Runs a script and returns a rows envelope.
pub fn run_query(db_id: i32, script: &str, params: &str, readonly: bool) -> FfiResult<String> {
    check_text(script, "script")?;
    check_text(params, "params")?;
    let db = Registry::global().resolve(db_id)?;
    debug!(db_id, readonly, "run_query");
    let start = Instant::now();
    let result = db.run_script(script, params, ScriptMutability::from(readonly))?;
    Ok(envelope::rows(&result, start.elapsed()))
}

/// Imports relation data.
pub fn import_relations(db_id: i32, payload: &str) -> FfiResult<String> {
    check_text(payload, "payload")?;
    let db = Registry::global().resolve(db_id)?;
    debug!(db_id, "import_relations");
    db.import_relations(payload)?;
    Ok(envelope::ok())
}

/// Exports relation data.
pub fn export_relations(db_id: i32, payload: &str) -> FfiResult<String> {
    check_text(payload, "payload")?;
    let db = Registry::global().resolve(db_id)?;
    debug!(db_id, "export_relations");
    Ok(envelope::data(db.export_relations(payload)?))
}

/// Writes a backup file.
pub fn backup(db_id: i32, out_path: &str) -> FfiResult<String> {
    check_text(out_path, "path")?;
    let db = Registry::global().resolve(db_id)?;
    debug!(db_id, "backup");
    db.backup(Path::new(out_path))?;
    Ok(envelope::ok())
}

/// Restores a backup into an empty database.
pub fn restore(db_id: i32, in_path: &str) -> FfiResult<String> {
    check_text(in_path, "path")?;
    let db = Registry::global().resolve(db_id)?;
    debug!(db_id, "restore");
    db.restore(Path::new(in_path))?;
    Ok(envelope::ok())
}

/// Imports selected relations from a backup file.
pub fn import_from_backup(db_id: i32, payload: &str) -> FfiResult<String> {
    check_text(payload, "payload")?;
    let db = Registry::global().resolve(db_id)?;
    debug!(db_id, "import_from_backup");
    db.import_from_backup(payload)?;
    Ok(envelope::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as JsonValue};

    fn parse(s: &str) -> JsonValue {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn query_envelope() {
        let id = open_db("mem", "", "{}").unwrap();
        let env = parse(&run_query(id, "?[a] <- [[1]]", "{}", false).unwrap());
        assert_eq!(env["ok"], json!(true));
        assert_eq!(env["rows"], json!([[1]]));
        assert!(close_db(id));
    }

    #[test]
    fn encoding_checked_before_handle() {
        let err = run_query(-5, "?[a]\0", "{}", false).unwrap_err();
        assert_eq!(err.kind_name(), "EncodingError");
        let err = run_query(-5, "?[a] <- [[1]]", "{}", false).unwrap_err();
        assert!(matches!(err, FfiError::HandleNotFound(-5)));
    }

    #[test]
    fn respond_renders_failures_and_panics() {
        let env = parse(&respond("test", 1, || Err(FfiError::HandleNotFound(1))));
        assert_eq!(env["ok"], json!(false));
        assert_eq!(env["kind"], json!("HandleNotFoundError"));

        let env = parse(&respond("test", 1, || panic!("engine exploded")));
        assert_eq!(env["kind"], json!("InternalError"));
        assert_eq!(env["message"], json!("internal error: engine exploded"));
    }

    #[test]
    fn construction_error_from_open() {
        let err = open_db("rocksdb", "", "{}").unwrap_err();
        assert_eq!(err.kind_name(), "EngineConstructionError");
        assert!(err.to_string().contains("rocksdb"));
    }
}
