//! Assay Core - Asset model and shared vocabulary of the analysis engine
//!
//! This crate provides the types every other assay crate speaks:
//! - Dynamic value types (`Value`, `ValueMap`) with JSON conversion
//! - Identifiers for assets, templates, attributes and scripts
//! - The asset/template/attribute/historian data model
//! - Tag paths (`PlantA.Pump-01.pressure`)
//! - Value coercion by declared data type
//! - Binding specifications for script inputs
//! - Timestamps, bucket widths and time formats for historian queries
//! - The write records a script may return (`Write`, `WriteSet`)
//!
//! ## Error Taxonomy
//!
//! Resolution, binding and coercion failures share one [`Error`] enum so the
//! outer layers can surface them verbatim.

pub mod binding;
pub mod coerce;
mod error;
mod identity;
mod model;
pub mod path;
pub mod time;
mod value;
pub mod write_set;

pub use binding::{
    script_name, AttributeRef, BindingSource, BindingSpec, BindingValue, ConstantType, SourceType,
};
pub use coerce::{coerce_attribute_value, coerce_constant};
pub use error::{Error, Result};
pub use identity::{AssetId, AttributeId, ScriptId, ScriptTemplateId, TemplateId, TemplateItemId};
pub use model::{
    AnalysisScript, AnalysisScriptTemplate, Asset, Attribute, AttributeTemplate, DataType,
    HistorianPoint, TemplateItem,
};
pub use path::TagPath;
pub use time::{parse_range, Bucket, TimeFormat, Timestamp};
pub use value::{Value, ValueMap};
pub use write_set::{HistorianQuery, ScriptOutput, Write, WriteSet};

/// Re-export IndexMap for ordered maps keyed by path or variable name
pub use indexmap::IndexMap;
