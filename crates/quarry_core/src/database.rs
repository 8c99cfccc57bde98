//! The reference database engine.

use crate::backup;
use crate::config::{DbOptions, EngineKind};
#[cfg(feature = "storage-file")]
use crate::dir::DatabaseDir;
use crate::engine::{Engine, ScriptMutability};
use crate::error::{CoreError, CoreResult};
use crate::eval::{self, Params, Relations};
use crate::relation::{NamedRows, Relation};
use crate::script;
use crate::value::DataValue;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// One relation in an import payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationData {
    /// Column names for each row.
    pub headers: Vec<String>,
    /// Rows of JSON values.
    pub rows: Vec<Vec<JsonValue>>,
    /// Key columns, used when the relation has to be created.
    #[serde(default)]
    pub keys: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExportRequest {
    relations: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BackupImportRequest {
    path: String,
    relations: Vec<String>,
}

/// A database instance: a set of stored relations behind a lock, plus
/// optional persistence.
#[derive(Debug)]
pub struct Db {
    kind: EngineKind,
    relations: RwLock<Relations>,
    #[cfg(feature = "storage-file")]
    dir: Option<DatabaseDir>,
}

impl Db {
    /// Opens a database of the given kind.
    #[cfg_attr(not(feature = "storage-file"), allow(unused_variables))]
    pub fn open(kind: EngineKind, path: &str, options: &DbOptions) -> CoreResult<Self> {
        match kind {
            EngineKind::Mem => Ok(Self::in_memory()),
            #[cfg(feature = "storage-file")]
            EngineKind::File => {
                if path.is_empty() {
                    return Err(CoreError::invalid_options(
                        "the file engine requires a directory path",
                    ));
                }
                let dir = DatabaseDir::open(
                    Path::new(path),
                    options.create_if_missing,
                    options.sync_on_write,
                )?;
                let relations = dir.load().map_err(|e| match e {
                    CoreError::InvalidFormat { message } => {
                        CoreError::invalid_options(format!("unreadable data file: {message}"))
                    }
                    other => other,
                })?;
                debug!(
                    path = %dir.path().display(),
                    relations = relations.len(),
                    "loaded file engine"
                );
                Ok(Self {
                    kind,
                    relations: RwLock::new(relations),
                    dir: Some(dir),
                })
            }
        }
    }

    /// Opens an empty in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            kind: EngineKind::Mem,
            relations: RwLock::new(Relations::new()),
            #[cfg(feature = "storage-file")]
            dir: None,
        }
    }

    /// Runs `f` against the store under the write lock.
    ///
    /// For persistent engines `f` works on a copy that replaces the store only
    /// after it has been saved.
    fn write<T>(&self, f: impl FnOnce(&mut Relations) -> CoreResult<T>) -> CoreResult<T> {
        let mut guard = self.relations.write();
        #[cfg(feature = "storage-file")]
        {
            if let Some(dir) = &self.dir {
                let mut next = guard.clone();
                let out = f(&mut next)?;
                dir.save(&next)?;
                *guard = next;
                return Ok(out);
            }
        }
        f(&mut guard)
    }

    /// Runs a parsed script with typed parameters.
    pub fn run(
        &self,
        script: &str,
        params: &Params,
        mutability: ScriptMutability,
    ) -> CoreResult<NamedRows> {
        let stmt = script::parse(script)?;
        match stmt.mutation() {
            None => eval::evaluate(&stmt, &self.relations.read(), params),
            Some(op) if mutability == ScriptMutability::Immutable => {
                Err(CoreError::ReadOnlyViolation { op: op.to_string() })
            }
            Some(_) => self.write(|relations| eval::apply(&stmt, relations, params)),
        }
    }

    /// Imports relation data. All relations are validated before any is written.
    pub fn import(&self, data: BTreeMap<String, RelationData>) -> CoreResult<()> {
        self.write(|relations| {
            let mut staged: Relations = BTreeMap::new();
            for (name, data) in &data {
                if let Some(target) = name.strip_prefix('-') {
                    let rel = stage(&mut staged, relations, target)?;
                    let positions = rel.column_positions(&data.headers, true)?;
                    for row in &data.rows {
                        let key = project_row(row, &positions, data.headers.len())?;
                        rel.remove(&key);
                    }
                    continue;
                }

                if !staged.contains_key(name) && !relations.contains_key(name) {
                    staged.insert(name.clone(), new_relation(name, data)?);
                }
                let rel = stage(&mut staged, relations, name)?;
                if data.headers.len() != rel.arity() {
                    return Err(CoreError::invalid_payload(format!(
                        "relation '{name}' has {} columns, payload has {}",
                        rel.arity(),
                        data.headers.len()
                    )));
                }
                if let Some(keys) = &data.keys {
                    if keys != rel.keys() {
                        return Err(CoreError::invalid_payload(format!(
                            "key columns of '{name}' do not match the stored relation"
                        )));
                    }
                }
                let positions = rel.column_positions(&data.headers, false)?;
                for row in &data.rows {
                    rel.put(project_row(row, &positions, data.headers.len())?);
                }
            }
            relations.extend(staged);
            Ok(())
        })
    }

    /// Exports the named relations.
    pub fn export(&self, names: &[String]) -> CoreResult<Map<String, JsonValue>> {
        let relations = self.relations.read();
        names
            .iter()
            .map(|name| {
                relations
                    .get(name)
                    .map(|rel| (name.clone(), rel.to_export_json()))
                    .ok_or_else(|| CoreError::relation_not_found(name))
            })
            .collect()
    }

    /// Copies whole relations into the store, creating missing ones.
    pub fn merge(&self, incoming: Vec<Relation>) -> CoreResult<()> {
        self.write(|relations| {
            for rel in &incoming {
                if let Some(existing) = relations.get(rel.name()) {
                    if !existing.same_schema(rel) {
                        return Err(CoreError::invalid_payload(format!(
                            "relation '{}' exists with a different schema",
                            rel.name()
                        )));
                    }
                }
            }
            for rel in incoming {
                match relations.get_mut(rel.name()) {
                    Some(existing) => rel.tuples().for_each(|t| existing.put(t)),
                    None => {
                        relations.insert(rel.name().to_string(), rel);
                    }
                }
            }
            Ok(())
        })
    }

    /// Names of all stored relations.
    #[must_use]
    pub fn relation_names(&self) -> Vec<String> {
        self.relations.read().keys().cloned().collect()
    }
}

fn stage<'a>(
    staged: &'a mut Relations,
    relations: &Relations,
    name: &str,
) -> CoreResult<&'a mut Relation> {
    if !staged.contains_key(name) {
        let rel = relations
            .get(name)
            .ok_or_else(|| CoreError::relation_not_found(name))?;
        staged.insert(name.to_string(), rel.clone());
    }
    staged
        .get_mut(name)
        .ok_or_else(|| CoreError::relation_not_found(name))
}

fn new_relation(name: &str, data: &RelationData) -> CoreResult<Relation> {
    let keys = data.keys.clone().unwrap_or_else(|| data.headers.clone());
    if let Some(missing) = keys.iter().find(|k| !data.headers.contains(k)) {
        return Err(CoreError::invalid_payload(format!(
            "key column '{missing}' of '{name}' is not among the headers"
        )));
    }
    let values = data
        .headers
        .iter()
        .filter(|h| !keys.contains(h))
        .cloned()
        .collect();
    Relation::new(name, keys, values).map_err(|e| CoreError::invalid_payload(e.to_string()))
}

fn project_row(row: &[JsonValue], positions: &[usize], width: usize) -> CoreResult<Vec<DataValue>> {
    if row.len() != width {
        return Err(CoreError::invalid_payload(format!(
            "row has {} values, expected {width}",
            row.len()
        )));
    }
    positions.iter().map(|&i| DataValue::from_json(&row[i])).collect()
}

fn parse_params(raw: &str) -> CoreResult<Params> {
    if raw.trim().is_empty() {
        return Ok(Params::new());
    }
    match serde_json::from_str::<JsonValue>(raw)? {
        JsonValue::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), DataValue::from_json(v)?)))
            .collect(),
        _ => Err(CoreError::invalid_payload("params must be a JSON object")),
    }
}

impl Engine for Db {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn run_script(
        &self,
        script: &str,
        params: &str,
        mutability: ScriptMutability,
    ) -> CoreResult<NamedRows> {
        let params = parse_params(params)?;
        self.run(script, &params, mutability)
    }

    fn import_relations(&self, payload: &str) -> CoreResult<()> {
        let data: BTreeMap<String, RelationData> = serde_json::from_str(payload)?;
        self.import(data)
    }

    fn export_relations(&self, payload: &str) -> CoreResult<JsonValue> {
        let request: ExportRequest = serde_json::from_str(payload)?;
        Ok(JsonValue::Object(self.export(&request.relations)?))
    }

    fn backup(&self, path: &Path) -> CoreResult<()> {
        let relations = self.relations.read();
        let metadata = backup::write_file(path, &relations)?;
        info!(
            path = %path.display(),
            relations = metadata.relation_count,
            bytes = metadata.size,
            "backup written"
        );
        Ok(())
    }

    fn restore(&self, path: &Path) -> CoreResult<()> {
        let (metadata, restored) = backup::read_file(path)?;
        self.write(|relations| {
            if !relations.is_empty() {
                return Err(CoreError::invalid_operation(
                    "restore requires an empty database",
                ));
            }
            *relations = restored;
            Ok(())
        })?;
        info!(
            path = %path.display(),
            relations = metadata.relation_count,
            "database restored"
        );
        Ok(())
    }

    fn import_from_backup(&self, payload: &str) -> CoreResult<()> {
        let request: BackupImportRequest = serde_json::from_str(payload)?;
        let (_, mut source) = backup::read_file(Path::new(&request.path))?;
        let selected = request
            .relations
            .iter()
            .map(|name| {
                source.remove(name).ok_or_else(|| {
                    CoreError::invalid_payload(format!("relation '{name}' not found in backup"))
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        self.merge(selected)?;
        info!(path = %request.path, relations = ?request.relations, "imported from backup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn seeded() -> Db {
        let db = Db::in_memory();
        db.run_script(":create kv {k => v}", "{}", ScriptMutability::Mutable)
            .unwrap();
        db.run_script(
            "?[k, v] <- [[1, 'a'], [2, 'b']] :put kv",
            "",
            ScriptMutability::Mutable,
        )
        .unwrap();
        db
    }

    #[test]
    fn run_with_json_params() {
        let db = seeded();
        let rows = db
            .run_script(
                "?[v] := *kv[k, v], k == $key",
                r#"{"key": 2}"#,
                ScriptMutability::Immutable,
            )
            .unwrap();
        assert_eq!(rows.rows, vec![vec![DataValue::Str("b".into())]]);
    }

    #[test]
    fn params_must_be_object() {
        let db = seeded();
        let err = db
            .run_script("?[a] <- [[1]]", "[1]", ScriptMutability::Mutable)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
        let err = db
            .run_script("?[a] <- [[1]]", "{", ScriptMutability::Mutable)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn immutable_rejects_writes_and_keeps_store() {
        let db = seeded();
        for script in [
            "?[k, v] <- [[3, 'c']] :put kv",
            "?[k] <- [[1]] :rm kv",
            ":create other {a}",
            "::remove kv",
        ] {
            let err = db
                .run_script(script, "{}", ScriptMutability::Immutable)
                .unwrap_err();
            assert!(matches!(err, CoreError::ReadOnlyViolation { .. }), "{script}");
        }
        assert_eq!(db.relation_names(), vec!["kv".to_string()]);
        let rows = db
            .run_script("?[k] := *kv[k, _]", "{}", ScriptMutability::Immutable)
            .unwrap();
        assert_eq!(rows.rows.len(), 2);
    }

    #[test]
    fn export_import_round_trip() {
        let db = seeded();
        let exported = db.export_relations(r#"{"relations": ["kv"]}"#).unwrap();
        assert_eq!(
            exported,
            json!({"kv": {"headers": ["k", "v"], "rows": [[1, "a"], [2, "b"]], "keys": ["k"]}})
        );

        let fresh = Db::in_memory();
        fresh.import_relations(&exported.to_string()).unwrap();
        let again = fresh.export_relations(r#"{"relations": ["kv"]}"#).unwrap();
        assert_eq!(again, exported);
    }

    #[test]
    fn import_deletes_with_minus_prefix() {
        let db = seeded();
        db.import_relations(r#"{"-kv": {"headers": ["k"], "rows": [[1]]}}"#)
            .unwrap();
        let rows = db
            .run_script("?[k] := *kv[k, _]", "{}", ScriptMutability::Immutable)
            .unwrap();
        assert_eq!(rows.rows, vec![vec![DataValue::Int(2)]]);
    }

    #[test]
    fn import_is_atomic() {
        let db = seeded();
        let err = db
            .import_relations(
                r#"{"kv": {"headers": ["k", "v"], "rows": [[9, "z"]]},
                    "zz": {"headers": ["a"], "rows": [[1, 2]]}}"#,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
        assert_eq!(db.relation_names(), vec!["kv".to_string()]);
        let rows = db
            .run_script("?[k] := *kv[k, _]", "{}", ScriptMutability::Immutable)
            .unwrap();
        assert_eq!(rows.rows.len(), 2);
    }

    #[test]
    fn export_unknown_relation() {
        let db = seeded();
        let err = db
            .export_relations(r#"{"relations": ["nope"]}"#)
            .unwrap_err();
        assert!(matches!(err, CoreError::RelationNotFound { .. }));
        assert!(db.export_relations("{}").is_err());
    }

    #[test]
    fn backup_restore_and_partial_import() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("kv.qrbk");
        let db = seeded();
        db.run_script(":create extra {x}", "{}", ScriptMutability::Mutable)
            .unwrap();
        db.backup(&path).unwrap();

        let err = db.restore(&path).unwrap_err();
        assert!(err.to_string().contains("empty database"));

        let restored = Db::in_memory();
        restored.restore(&path).unwrap();
        assert_eq!(
            restored.relation_names(),
            vec!["extra".to_string(), "kv".to_string()]
        );

        let partial = Db::in_memory();
        let payload = json!({"path": path.to_str().unwrap(), "relations": ["kv"]});
        partial.import_from_backup(&payload.to_string()).unwrap();
        assert_eq!(partial.relation_names(), vec!["kv".to_string()]);

        let payload = json!({"path": path.to_str().unwrap(), "relations": ["ghost"]});
        assert!(partial.import_from_backup(&payload.to_string()).is_err());
    }

    #[test]
    fn restore_missing_file_is_io_error() {
        let db = Db::in_memory();
        let err = db.restore(Path::new("/nonexistent/quarry/backup")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[cfg(feature = "storage-file")]
    #[test]
    fn file_engine_persists_across_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("db");
        let path = path.to_str().unwrap();
        let options = DbOptions::default().sync_on_write(false);
        {
            let db = Db::open(EngineKind::File, path, &options).unwrap();
            db.run_script(":create kv {k => v}", "{}", ScriptMutability::Mutable)
                .unwrap();
            db.run_script("?[k, v] <- [[1, 2]] :put kv", "{}", ScriptMutability::Mutable)
                .unwrap();
            let second = Db::open(EngineKind::File, path, &options).unwrap_err();
            assert_eq!(second.kind(), ErrorKind::Construction);
        }
        let db = Db::open(EngineKind::File, path, &options).unwrap();
        let rows = db
            .run_script("?[k, v] := *kv[k, v]", "{}", ScriptMutability::Immutable)
            .unwrap();
        assert_eq!(rows.rows, vec![vec![DataValue::Int(1), DataValue::Int(2)]]);
    }

    #[cfg(feature = "storage-file")]
    #[test]
    fn file_engine_requires_path() {
        let err = Db::open(EngineKind::File, "", &DbOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction);
    }
}
