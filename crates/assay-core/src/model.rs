//! Asset, template, attribute, historian and script records
//!
//! These are the shapes the rest of the engine passes around; `assay-db`
//! converts them to and from its stored models, and the HTTP layer renders
//! them as camelCase JSON.

use crate::{
    AssetId, AttributeId, Error, ScriptId, ScriptTemplateId, TemplateId, TemplateItemId, Value,
};
use crate::binding::BindingSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared type of a template item's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    #[default]
    String,
    Number,
    Boolean,
    Array,
    Object,
    Json,
}

impl DataType {
    /// The uppercase name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "STRING",
            DataType::Number => "NUMBER",
            DataType::Boolean => "BOOLEAN",
            DataType::Array => "ARRAY",
            DataType::Object => "OBJECT",
            DataType::Json => "JSON",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRING" => Ok(DataType::String),
            "NUMBER" => Ok(DataType::Number),
            "BOOLEAN" => Ok(DataType::Boolean),
            "ARRAY" => Ok(DataType::Array),
            "OBJECT" => Ok(DataType::Object),
            "JSON" => Ok(DataType::Json),
            other => Err(Error::ParseError(format!("unknown data type '{}'", other))),
        }
    }
}

/// A node in the asset hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub description: Option<String>,
    pub parent_asset_id: Option<AssetId>,
    pub template_id: Option<TemplateId>,
}

/// A named set of typed items that assets instantiate as attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeTemplate {
    pub id: TemplateId,
    pub name: String,
    pub description: Option<String>,
}

/// One typed slot of an attribute template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateItem {
    pub id: TemplateItemId,
    pub template_id: TemplateId,
    pub name: String,
    pub data_type: DataType,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub default_value: Value,
    /// Position within the template
    pub position: u32,
}

/// The live value of one template item on one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub id: AttributeId,
    pub asset_id: AssetId,
    pub template_item_id: TemplateItemId,
    pub value: Value,
}

/// One time-series sample of an attribute, ts in epoch milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorianPoint {
    pub attribute_id: AttributeId,
    pub ts: i64,
    pub value: Value,
}

/// A stored, named analysis script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisScript {
    pub id: ScriptId,
    pub name: String,
    pub script: String,
    pub inputs: Vec<BindingSpec>,
    pub template_id: Option<ScriptTemplateId>,
}

/// A reusable script body with its input specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisScriptTemplate {
    pub id: ScriptTemplateId,
    pub name: String,
    pub script: String,
    pub inputs: Vec<BindingSpec>,
}

impl AnalysisScript {
    /// Effective body and inputs: a linked template supplies both
    pub fn effective<'a>(
        &'a self,
        template: Option<&'a AnalysisScriptTemplate>,
    ) -> (&'a str, &'a [BindingSpec]) {
        match template {
            Some(t) => (&t.script, &t.inputs),
            None => (&self.script, &self.inputs),
        }
    }
}
