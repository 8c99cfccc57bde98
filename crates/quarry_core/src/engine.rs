//! The engine capability.
//!
//! Everything above the engine (handle registries, C bindings) talks to a
//! database only through [`Engine`], so storage specifics never leak out.

use crate::config::{DbOptions, EngineKind};
use crate::database::Db;
use crate::error::CoreResult;
use crate::relation::NamedRows;
use serde_json::Value as JsonValue;
use std::path::Path;
use tracing::info;

/// Whether a script may modify stored relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMutability {
    /// Reads and writes are allowed.
    Mutable,
    /// Any write fails before the store is touched.
    Immutable,
}

impl From<bool> for ScriptMutability {
    /// `true` means immutable.
    fn from(immutable: bool) -> Self {
        if immutable {
            Self::Immutable
        } else {
            Self::Mutable
        }
    }
}

/// An open database instance.
///
/// Implementations synchronize internally; every method may be called from
/// several threads at once.
pub trait Engine: Send + Sync {
    /// The storage engine kind.
    fn kind(&self) -> EngineKind;

    /// Runs a script. `params` must be a JSON object.
    fn run_script(
        &self,
        script: &str,
        params: &str,
        mutability: ScriptMutability,
    ) -> CoreResult<NamedRows>;

    /// Imports rows in the shape produced by [`Engine::export_relations`].
    ///
    /// Imports bypass script evaluation, so no triggers run.
    fn import_relations(&self, payload: &str) -> CoreResult<()>;

    /// Exports relations named by `{"relations": [...]}`.
    fn export_relations(&self, payload: &str) -> CoreResult<JsonValue>;

    /// Writes a backup file to `path`.
    fn backup(&self, path: &Path) -> CoreResult<()>;

    /// Replaces the (empty) store with the contents of a backup file.
    fn restore(&self, path: &Path) -> CoreResult<()>;

    /// Imports selected relations from a backup: `{"path": ..., "relations": [...]}`.
    fn import_from_backup(&self, payload: &str) -> CoreResult<()>;
}

/// Constructs an engine from its kind name, path and JSON options.
pub fn open_engine(kind: &str, path: &str, options: &str) -> CoreResult<Box<dyn Engine>> {
    let kind: EngineKind = kind.parse()?;
    let options = DbOptions::from_json(options)?;
    let db = Db::open(kind, path, &options)?;
    info!(engine = %kind, path, "opened engine");
    Ok(Box::new(db))
}
