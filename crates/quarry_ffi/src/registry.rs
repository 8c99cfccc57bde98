//! Handle registry: integer ids mapped to open engines.
//!
//! Ids come from a monotonic counter and are never reused. Engines are held
//! as `Arc`s, so a call that resolved a handle keeps its engine alive even if
//! the handle is closed while the call is in flight.

use crate::error::{FfiError, FfiResult};
use parking_lot::RwLock;
use quarry_core::{open_engine, Engine};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Open engines by handle id.
pub struct Registry {
    handles: RwLock<HashMap<i32, Arc<dyn Engine>>>,
    next_id: AtomicI32,
}

impl Registry {
    /// Creates an empty registry whose first id is 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    fn starting_at(first: i32) -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            next_id: AtomicI32::new(first),
        }
    }

    /// The process-wide registry used by the C entry points.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Constructs an engine and registers it under a fresh id.
    ///
    /// On failure nothing is registered.
    pub fn open(&self, kind: &str, path: &str, options: &str) -> FfiResult<i32> {
        let engine: Arc<dyn Engine> = Arc::from(open_engine(kind, path, options)?);
        let mut handles = self.handles.write();
        let id = self
            .next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| FfiError::HandlesExhausted)?;
        handles.insert(id, engine);
        info!(db_id = id, engine = kind, "database opened");
        Ok(id)
    }

    /// Closes a handle. Returns false if `id` is not open.
    ///
    /// The engine is dropped once every in-flight call holding it returns.
    pub fn close(&self, id: i32) -> bool {
        let removed = self.handles.write().remove(&id);
        match removed {
            Some(_) => {
                info!(db_id = id, "database closed");
                true
            }
            None => false,
        }
    }

    /// Looks up an open handle.
    pub fn resolve(&self, id: i32) -> FfiResult<Arc<dyn Engine>> {
        self.handles
            .read()
            .get(&id)
            .cloned()
            .ok_or(FfiError::HandleNotFound(id))
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    /// Returns true if no handle is open.
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }

    /// Closes every open handle and returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.handles.write().drain().collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all databases");
        }
        drained.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
