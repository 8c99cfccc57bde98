//! # Quarry FFI
//!
//! Stable C ABI for Quarry bindings.
//!
//! This crate provides:
//! - A registry of open databases addressed by `i32` handle ids
//! - `extern "C"` entry points returning JSON envelopes
//! - The string ownership protocol (`quarry_free_str`)
//! - A safe Rust mirror of the entry points in [`dispatch`]
//!
//! ## Memory ownership
//!
//! Every non-null `char *` returned by a `quarry_*` function belongs to the
//! caller and must be released with `quarry_free_str` exactly once. The one
//! exception is `quarry_version`, whose result is static. `quarry_close_db`
//! returns a plain boolean and allocates nothing.
//!
//! ## Threading
//!
//! All entry points run synchronously on the calling thread and may be called
//! from any number of threads at once, including on the same handle.

mod database;
pub mod dispatch;
mod envelope;
mod error;
mod registry;
mod strings;

pub use database::{
    quarry_backup, quarry_close_db, quarry_export_relations, quarry_import_from_backup,
    quarry_import_relations, quarry_open_db, quarry_restore, quarry_run_query, quarry_version,
};
pub use error::{FfiError, FfiResult};
pub use registry::Registry;
pub use strings::{outstanding_strings, quarry_free_str};
