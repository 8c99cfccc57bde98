//! Engine configuration.

use crate::error::{CoreError, CoreResult};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Storage engine behind a database instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Ephemeral in-memory store.
    Mem,
    /// Directory-backed store that survives restarts.
    #[cfg(feature = "storage-file")]
    File,
}

impl EngineKind {
    /// Kinds compiled into this build.
    #[cfg(feature = "storage-file")]
    pub const SUPPORTED: &'static [EngineKind] = &[EngineKind::Mem, EngineKind::File];

    /// Kinds compiled into this build.
    #[cfg(not(feature = "storage-file"))]
    pub const SUPPORTED: &'static [EngineKind] = &[EngineKind::Mem];

    /// Name used to select this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mem => "mem",
            #[cfg(feature = "storage-file")]
            Self::File => "file",
        }
    }

    fn supported_list() -> String {
        Self::SUPPORTED
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::SUPPORTED
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::UnknownEngine {
                kind: s.to_string(),
                supported: Self::supported_list(),
            })
    }
}

/// Options accepted when opening a database.
///
/// Parsed from the JSON object passed to `open`. Unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbOptions {
    /// Whether to create the database directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the snapshot after every mutation.
    pub sync_on_write: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
        }
    }
}

impl DbOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON object. Blank input means defaults.
    pub fn from_json(raw: &str) -> CoreResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| CoreError::invalid_options(e.to_string()))
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync after every mutation.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }
}
