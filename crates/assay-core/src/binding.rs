//! Script input bindings
//!
//! A script declares its inputs as a list of [`BindingSpec`]s. The hub turns
//! each spec into a [`BindingValue`] before the script runs; inside the
//! script the variable is the map form of that value, so scripts read
//! `pressure.value`, `pressure.unit` and so on.

use crate::{AssetId, AttributeId, DataType, Error, Result, TemplateItemId, Value, ValueMap};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// ASCII identifiers; `$` is allowed anywhere
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_$][A-Za-z0-9_$]*$";

static IDENTIFIER: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

fn is_identifier(name: &str) -> Result<bool> {
    IDENTIFIER
        .get_or_init(|| Regex::new(IDENTIFIER_PATTERN))
        .as_ref()
        .map(|re| re.is_match(name))
        .map_err(|e| Error::InvalidBinding(format!("identifier pattern: {}", e)))
}

/// Name a binding takes inside the script; Rhai identifiers cannot hold `$`
pub fn script_name(name: &str) -> String {
    name.replace('$', "_")
}

/// Where a binding's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Attribute,
    Constant,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Attribute => "attribute",
            SourceType::Constant => "constant",
        }
    }
}

/// Declared type of a constant binding
///
/// Unknown type names fall back to `string`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConstantType {
    Number,
    Boolean,
    Array,
    Object,
    #[default]
    #[serde(other)]
    String,
}

/// One declared script input, as stored with the script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BindingSpec {
    pub variable_name: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub constant_type: Option<ConstantType>,
    #[serde(default)]
    pub constant_value: Option<Value>,
    #[serde(default)]
    pub attribute_path: Option<String>,
    /// `"{assetId}::{templateItemId}"`
    #[serde(default)]
    pub attribute_key: Option<String>,
}

/// How an attribute binding names its attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeRef {
    Key {
        asset_id: AssetId,
        template_item_id: TemplateItemId,
        /// Path carried through for display only
        path: Option<String>,
    },
    Path(String),
}

/// The typed source of a binding
#[derive(Debug, Clone, PartialEq)]
pub enum BindingSource {
    Constant {
        constant_type: ConstantType,
        value: Value,
    },
    Attribute(AttributeRef),
}

impl BindingSpec {
    /// A constant input
    pub fn constant(name: impl Into<String>, constant_type: ConstantType, value: Value) -> Self {
        Self {
            variable_name: name.into(),
            source_type: SourceType::Constant,
            constant_type: Some(constant_type),
            constant_value: Some(value),
            ..Default::default()
        }
    }

    /// An attribute input addressed by tag path
    pub fn path(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            variable_name: name.into(),
            source_type: SourceType::Attribute,
            attribute_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// An attribute input addressed by `(assetId, templateItemId)`
    pub fn key(name: impl Into<String>, asset_id: AssetId, template_item_id: TemplateItemId) -> Self {
        Self {
            variable_name: name.into(),
            source_type: SourceType::Attribute,
            attribute_key: Some(format!("{}::{}", asset_id.raw(), template_item_id.raw())),
            ..Default::default()
        }
    }

    /// The trimmed variable name, `None` when blank
    ///
    /// Names must look like identifiers (`[A-Za-z_$][\w$]*`).
    pub fn validated_name(&self) -> Result<Option<&str>> {
        let name = self.variable_name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        if !is_identifier(name)? {
            return Err(Error::InvalidBinding(format!("Invalid variable name: {}", name)));
        }
        Ok(Some(name))
    }

    /// Interpret the stored fields as a typed source
    pub fn source(&self) -> Result<BindingSource> {
        let name = self.variable_name.trim();
        match self.source_type {
            SourceType::Constant => Ok(BindingSource::Constant {
                constant_type: self.constant_type.unwrap_or_default(),
                value: self.constant_value.clone().unwrap_or_default(),
            }),
            SourceType::Attribute => {
                if let Some(key) = self.attribute_key.as_deref().filter(|k| !k.is_empty()) {
                    let (asset_id, template_item_id) = parse_attribute_key(key)?;
                    return Ok(BindingSource::Attribute(AttributeRef::Key {
                        asset_id,
                        template_item_id,
                        path: self.attribute_path.clone(),
                    }));
                }
                match self.attribute_path.as_deref().filter(|p| !p.is_empty()) {
                    Some(path) => Ok(BindingSource::Attribute(AttributeRef::Path(path.to_string()))),
                    None => Err(Error::InvalidBinding(format!(
                        "Attribute path required for {}",
                        name
                    ))),
                }
            }
        }
    }
}

fn parse_attribute_key(key: &str) -> Result<(AssetId, TemplateItemId)> {
    let invalid = || Error::InvalidBinding("Invalid attributeKey format".to_string());
    let (asset, item) = key.split_once("::").ok_or_else(invalid)?;
    let asset = asset.trim().parse::<u64>().map_err(|_| invalid())?;
    let item = item.trim().parse::<u64>().map_err(|_| invalid())?;
    Ok((AssetId(asset), TemplateItemId(item)))
}

/// A resolved input, ready to inject into a script
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingValue {
    pub source_type: SourceType,
    pub value: Value,
    pub data_type: Option<DataType>,
    pub unit: Option<String>,
    pub asset_id: Option<AssetId>,
    pub template_item_id: Option<TemplateItemId>,
    pub attribute_id: Option<AttributeId>,
    pub path: Option<String>,
}

impl BindingValue {
    /// A constant binding
    pub fn constant(value: Value) -> Self {
        Self {
            source_type: SourceType::Constant,
            value,
            data_type: None,
            unit: None,
            asset_id: None,
            template_item_id: None,
            attribute_id: None,
            path: None,
        }
    }

    /// The map a script sees for this binding
    pub fn to_value(&self) -> Value {
        let id = |raw: Option<u64>| raw.map(Value::from).unwrap_or_default();
        let mut map = ValueMap::new();
        map.insert("sourceType".into(), self.source_type.as_str().into());
        map.insert("value".into(), self.value.clone());
        map.insert(
            "dataType".into(),
            self.data_type.map(|d| Value::from(d.as_str())).unwrap_or_default(),
        );
        map.insert("unit".into(), self.unit.clone().into());
        map.insert("assetId".into(), id(self.asset_id.map(|i| i.raw())));
        map.insert(
            "templateItemId".into(),
            id(self.template_item_id.map(|i| i.raw())),
        );
        map.insert("attributeId".into(), id(self.attribute_id.map(|i| i.raw())));
        map.insert("path".into(), self.path.clone().into());
        Value::Map(map)
    }
}
