//! End-to-end tests of the C entry points.

mod common;

use common::*;
use proptest::prelude::*;
use quarry_ffi::{quarry_close_db, quarry_open_db, quarry_run_query};
use serde_json::json;

#[test]
fn open_query_close_lifecycle() {
    let id = open("mem", "", "{}").unwrap();
    assert!(id >= 0);

    let env = query(id, "?[a] <- [[1]]", "{}", false);
    assert_eq!(env["ok"], true);
    assert_eq!(env["headers"], json!(["a"]));
    assert_eq!(env["rows"], json!([[1]]));
    assert!(env["took"].is_f64());

    assert!(quarry_close_db(id));

    let env = query(id, "?[a] <- [[1]]", "{}", false);
    assert!(is_failure(&env, "HandleNotFoundError"), "{env}");
    assert!(env["message"].as_str().unwrap().contains("not found"));

    assert!(!quarry_close_db(id));
}

#[test]
fn unknown_handle_fails_every_operation() {
    let id = i32::MIN;
    assert!(!quarry_close_db(id));
    for env in [
        query(id, "?[a] <- [[1]]", "{}", true),
        import(id, "{}"),
        export(id, r#"{"relations": []}"#),
        backup(id, "/tmp/never-written"),
        restore(id, "/tmp/never-read"),
        import_from_backup(id, r#"{"path": "x", "relations": []}"#),
    ] {
        assert!(is_failure(&env, "HandleNotFoundError"), "{env}");
    }
}

#[test]
fn invalid_utf8_rejected_before_registry() {
    let bad = [0xc3u8, 0x28, 0];
    let params = c("{}");
    let env = envelope(unsafe { quarry_run_query(i32::MIN, bad.as_ptr().cast(), params.as_ptr(), false) });
    assert!(is_failure(&env, "EncodingError"), "{env}");

    let mut id = -1;
    let msg = take(unsafe {
        quarry_open_db(bad.as_ptr().cast(), params.as_ptr(), params.as_ptr(), &mut id)
    });
    assert!(msg.contains("invalid engine"), "{msg}");
    assert_eq!(id, -1);
}

#[test]
fn open_failures_are_messages() {
    let msg = open("sqlite", "", "{}").unwrap_err();
    assert!(msg.contains("unknown engine 'sqlite'"), "{msg}");

    let msg = open("mem", "", r#"{"cache_size": 10}"#).unwrap_err();
    assert!(msg.contains("invalid engine options"), "{msg}");
}

#[test]
fn readonly_query_cannot_mutate() {
    let id = open_mem();
    assert_eq!(query(id, ":create kv {k => v}", "{}", false)["ok"], true);
    assert_eq!(
        query(id, "?[k, v] <- [[1, 'a']] :put kv", "{}", false)["ok"],
        true
    );
    let before = export_all(id);

    for script in [
        "?[k, v] <- [[2, 'b']] :put kv",
        "?[k] <- [[1]] :rm kv",
        ":create other {x}",
        "::remove kv",
    ] {
        let env = query(id, script, "{}", true);
        assert!(is_failure(&env, "ScriptError"), "{script}: {env}");
    }

    assert_eq!(export_all(id), before);
    assert!(quarry_close_db(id));
}

#[test]
fn script_errors_are_envelopes() {
    let id = open_mem();
    let env = query(id, "?[a] <~ [[1]]", "{}", false);
    assert!(is_failure(&env, "ScriptError"), "{env}");

    let env = query(id, "?[a] := *missing[a]", "{}", false);
    assert!(is_failure(&env, "ScriptError"), "{env}");

    let env = query(id, "?[a] <- $rows", "not json", false);
    assert!(is_failure(&env, "SerializationError"), "{env}");

    let env = query(id, "?[a] <- $rows", r#"{"rows": [[1], [2], [1]]}"#, false);
    assert_eq!(env["rows"], json!([[1], [2]]));
    assert!(quarry_close_db(id));
}

#[test]
fn deeply_nested_script_is_rejected() {
    let id = open_mem();
    let script = format!("?[a] <- {}", "[".repeat(200_000));
    let env = query(id, &script, "{}", false);
    assert!(is_failure(&env, "ScriptError"), "{env}");
    assert!(env["message"].as_str().unwrap().contains("nesting too deep"), "{env}");

    let script = format!("?[a] <- {}{}", "[".repeat(100), "]".repeat(100));
    let env = query(id, &script, "{}", true);
    assert_eq!(env["ok"], true, "{env}");
    assert_eq!(env["rows"].as_array().unwrap().len(), 1);

    let params = format!(r#"{{"rows": {}{}}}"#, "[".repeat(200), "]".repeat(200));
    let env = query(id, "?[a] <- $rows", &params, true);
    assert!(is_failure(&env, "SerializationError"), "{env}");

    let env = query(id, "?[a] <- [[-9223372036854775808]]", "{}", true);
    assert_eq!(env["rows"], json!([[i64::MIN]]));
    assert!(quarry_close_db(id));
}

#[test]
fn large_scripts_and_params() {
    let id = open_mem();
    let rows: Vec<String> = (0..5_000).map(|i| format!("[{i}, 'row {i}']")).collect();
    let script = format!("?[n, s] <- [{}]", rows.join(", "));
    let env = query(id, &script, "{}", true);
    assert_eq!(env["ok"], true);
    assert_eq!(env["rows"].as_array().unwrap().len(), 5_000);
    assert_eq!(env["rows"][4_999], json!([4_999, "row 4999"]));

    let rows: Vec<_> = (0..20_000).map(|i| json!([i, "x".repeat(16)])).collect();
    let params = json!({ "rows": rows }).to_string();
    let env = query(id, "?[n, s] <- $rows", &params, true);
    assert_eq!(env["rows"].as_array().unwrap().len(), 20_000);
    assert!(quarry_close_db(id));
}

#[test]
fn export_then_import_into_fresh_handle() {
    let source = open_mem();
    query(source, ":create users {id => name, tags}", "{}", false);
    query(
        source,
        "?[id, name, tags] <- [[1, 'ann', ['a']], [2, 'bob', []]] :put users",
        "{}",
        false,
    );
    query(source, ":create edges {src, dst}", "{}", false);
    query(source, "?[src, dst] <- [[1, 2], [2, 1]] :put edges", "{}", false);

    let original = export_all(source);
    assert_eq!(original["users"]["keys"], json!(["id"]));

    let target = open_mem();
    let env = import(target, &original.to_string());
    assert_eq!(env, json!({"ok": true}));
    assert_eq!(export_all(target), original);

    assert!(quarry_close_db(source));
    assert!(quarry_close_db(target));
}

#[test]
fn bulk_failures_are_serialization_errors() {
    let id = open_mem();
    assert!(is_failure(&import(id, "[1, 2]"), "SerializationError"));
    assert!(is_failure(&export(id, "{}"), "SerializationError"));
    assert!(is_failure(&import_from_backup(id, r#"{"path": 1}"#), "SerializationError"));
    assert!(quarry_close_db(id));
}

#[test]
fn backup_restore_and_selective_import() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("snapshot.qrbk");
    let file = file.to_str().unwrap();

    let id = open_mem();
    query(id, ":create a {x}", "{}", false);
    query(id, ":create b {y}", "{}", false);
    query(id, "?[x] <- [[1], [2]] :put a", "{}", false);
    assert_eq!(backup(id, file), json!({"ok": true}));
    assert!(is_failure(&backup(id, file), "IOError"));

    let restored = open_mem();
    assert_eq!(restore(restored, file), json!({"ok": true}));
    assert_eq!(export_all(restored), export_all(id));
    assert!(is_failure(&restore(restored, file), "ScriptError"));

    let partial = open_mem();
    let payload = json!({"path": file, "relations": ["a"]});
    assert_eq!(import_from_backup(partial, &payload.to_string()), json!({"ok": true}));
    let data = export_all(partial);
    assert_eq!(data["a"]["rows"], json!([[1], [2]]));
    assert!(data.get("b").is_none());

    let missing = temp.path().join("missing.qrbk");
    assert!(is_failure(&restore(open_mem(), missing.to_str().unwrap()), "IOError"));

    for handle in [id, restored, partial] {
        assert!(quarry_close_db(handle));
    }
}

#[test]
fn file_engine_locks_its_directory() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("db");
    let path = path.to_str().unwrap();
    let options = r#"{"sync_on_write": false}"#;

    let id = open("file", path, options).unwrap();
    query(id, ":create kv {k => v}", "{}", false);
    query(id, "?[k, v] <- [['a', 1]] :put kv", "{}", false);

    let msg = open("file", path, options).unwrap_err();
    assert!(msg.contains("locked"), "{msg}");

    assert!(quarry_close_db(id));
    let reopened = open("file", path, options).unwrap();
    let env = query(reopened, "?[k, v] := *kv[k, v]", "{}", true);
    assert_eq!(env["rows"], json!([["a", 1]]));
    assert!(quarry_close_db(reopened));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn round_trip_law(rows in prop::collection::btree_map(any::<i64>(), "[a-z]{0,6}", 0..20)) {
        let source = open_mem();
        let rows: Vec<_> = rows.into_iter().map(|(k, v)| json!([k, v])).collect();
        let payload = json!({"kv": {"headers": ["k", "v"], "rows": rows, "keys": ["k"]}});
        prop_assert_eq!(import(source, &payload.to_string()), json!({"ok": true}));

        let original = export_all(source);
        let target = open_mem();
        prop_assert_eq!(import(target, &original.to_string()), json!({"ok": true}));
        prop_assert_eq!(export_all(target), original);

        prop_assert!(quarry_close_db(source));
        prop_assert!(quarry_close_db(target));
    }
}
