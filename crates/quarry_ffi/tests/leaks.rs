//! Every returned string is released exactly once.
//!
//! Kept in its own test binary so no other test moves the counter.

mod common;

use common::*;
use quarry_ffi::{outstanding_strings, quarry_close_db};
use std::thread;

#[test]
fn mixed_traffic_leaves_no_outstanding_strings() {
    assert_eq!(outstanding_strings(), 0);

    let id = open_mem();
    // A successful open allocates nothing.
    assert_eq!(outstanding_strings(), 0);

    let temp = tempfile::tempdir().unwrap();
    let workers: Vec<_> = (0..4)
        .map(|t| {
            let dir = temp.path().to_path_buf();
            thread::spawn(move || {
                let own = open_mem();
                query(own, ":create r {a => b}", "{}", false);
                for i in 0..30 {
                    let script = format!("?[a, b] <- [[{i}, {t}]] :put r");
                    query(own, &script, "{}", false);
                    query(own, "?[a] := *r[a, _]", "{}", true);
                    query(own, "?[a] := *r[a, _] :put r", "{}", true);
                    export(own, r#"{"relations": ["r"]}"#);
                    import(own, r#"{"r": {"headers": ["a", "b"], "rows": [[0, 0]]}}"#);
                    query(id, "?[x] <- [[1]]", "{}", true);
                    query(-1, "?[x] <- [[1]]", "{}", true);
                }
                let file = dir.join(format!("b{t}.qrbk"));
                backup(own, file.to_str().unwrap());
                backup(own, file.to_str().unwrap());
                restore(own, file.to_str().unwrap());
                assert!(quarry_close_db(own));
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(open("bogus", "", "{}").is_err());
    assert!(quarry_close_db(id));
    assert!(!quarry_close_db(id));
    assert_eq!(outstanding_strings(), 0);
}
