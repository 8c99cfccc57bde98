//! # Quarry Core
//!
//! Relational engine behind the Quarry C bindings.
//!
//! This crate provides:
//! - A small relational script dialect (queries, writes, system ops)
//! - In-memory and file-backed storage engines
//! - JSON import/export of stored relations
//! - Checksummed backup files
//!
//! Callers reach an engine through [`open_engine`] and the [`Engine`] trait.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod config;
mod database;
#[cfg(feature = "storage-file")]
mod dir;
mod engine;
mod error;
mod eval;
mod relation;
mod script;
mod value;

pub use backup::BackupMetadata;
pub use config::{DbOptions, EngineKind};
pub use database::{Db, RelationData};
pub use engine::{open_engine, Engine, ScriptMutability};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use eval::{Params, Relations};
pub use relation::{NamedRows, Relation};
pub use value::DataValue;
