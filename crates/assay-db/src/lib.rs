//! Assay DB - Storage layer using native_db
//!
//! Provides persistent (or in-memory) storage for:
//! - Assets and their parent hierarchy
//! - Attribute templates and template items
//! - Attribute live values
//! - Historian points keyed by `(attribute, ts)`
//! - Analysis scripts and script templates
//!
//! Dynamic values are stored as bincode bytes inside each row.

mod error;
mod models;
mod queries;
mod store;

pub use error::{Error, Result};
pub use store::{NewAsset, NewScript, NewTemplateItem, Store};
