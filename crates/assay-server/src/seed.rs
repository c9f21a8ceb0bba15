//! RON seed data applied at startup
//!
//! ```ron
//! #![enable(implicit_some)]
//! (
//!     templates: [(name: "Pump", items: [(name: "pressure", data_type: NUMBER, unit: "bar")])],
//!     assets: [(name: "Plant A", children: [(name: "Pump-01", template: "Pump", attributes: {"pressure": 6.5})])],
//!     scripts: [(name: "double-pressure", script: "...")],
//! )
//! ```

use assay_core::{
    coerce_attribute_value, BindingSpec, DataType, IndexMap, TemplateId, TemplateItem, Timestamp,
    Value,
};
use assay_db::{NewAsset, NewScript, NewTemplateItem, Store};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub templates: Vec<SeedTemplate>,
    #[serde(default)]
    pub assets: Vec<SeedAsset>,
    #[serde(default)]
    pub script_templates: Vec<SeedScriptTemplate>,
    #[serde(default)]
    pub scripts: Vec<SeedScript>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedTemplate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<SeedItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedItem {
    pub name: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedAsset {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Attribute template by name
    #[serde(default)]
    pub template: Option<String>,
    /// Live values by template item name
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
    #[serde(default)]
    pub historian: Vec<SeedPoint>,
    #[serde(default)]
    pub children: Vec<SeedAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedPoint {
    /// Template item name
    pub attribute: String,
    pub ts: Value,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedScriptTemplate {
    pub name: String,
    pub script: String,
    #[serde(default)]
    pub inputs: Vec<BindingSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedScript {
    pub name: String,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub inputs: Vec<BindingSpec>,
    /// Script template by name
    #[serde(default)]
    pub template: Option<String>,
}

/// Counts of seeded records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub templates: usize,
    pub assets: usize,
    pub points: usize,
    pub scripts: usize,
}

/// Seed errors
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    #[error("'{asset}' has no attribute '{attribute}'")]
    UnknownAttribute { asset: String, attribute: String },
    #[error(transparent)]
    Core(#[from] assay_core::Error),
    #[error("storage error: {0}")]
    Storage(#[from] assay_db::Error),
}

impl Seed {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| SeedError::Io(e.to_string()))?;
        Self::from_ron(&content)
    }

    pub fn from_ron(content: &str) -> Result<Self, SeedError> {
        ron::from_str(content).map_err(|e| SeedError::Parse(e.to_string()))
    }

    /// Write every record into the store
    pub fn apply(&self, store: &Store) -> Result<SeedSummary, SeedError> {
        let mut summary = SeedSummary::default();

        let mut templates: HashMap<&str, (TemplateId, Vec<TemplateItem>)> = HashMap::new();
        for template in &self.templates {
            let created = store.create_template(&template.name, template.description.clone())?;
            let mut items = Vec::with_capacity(template.items.len());
            for item in &template.items {
                items.push(store.add_template_item(
                    created.id,
                    NewTemplateItem {
                        name: item.name.clone(),
                        data_type: item.data_type,
                        unit: item.unit.clone(),
                        description: item.description.clone(),
                        default_value: coerce_attribute_value(item.data_type, &item.default_value)?,
                    },
                )?);
            }
            templates.insert(template.name.as_str(), (created.id, items));
            summary.templates += 1;
        }

        let mut pending: Vec<(Option<assay_core::AssetId>, &SeedAsset)> =
            self.assets.iter().map(|a| (None, a)).collect();
        while !pending.is_empty() {
            let mut next = Vec::new();
            for (parent, asset) in pending {
                let template = match &asset.template {
                    Some(name) => Some(
                        templates
                            .get(name.as_str())
                            .ok_or_else(|| SeedError::UnknownTemplate(name.clone()))?,
                    ),
                    None => None,
                };
                let created = store.create_asset(NewAsset {
                    name: asset.name.clone(),
                    description: asset.description.clone(),
                    parent_asset_id: parent,
                    template_id: template.map(|(id, _)| *id),
                })?;
                summary.assets += 1;

                let items = template.map(|(_, items)| items.as_slice()).unwrap_or_default();
                let find = |attribute: &str| {
                    items
                        .iter()
                        .find(|i| i.name == attribute)
                        .ok_or_else(|| SeedError::UnknownAttribute {
                            asset: asset.name.clone(),
                            attribute: attribute.to_string(),
                        })
                };
                for (attribute, raw) in &asset.attributes {
                    let item = find(attribute)?;
                    let value = coerce_attribute_value(item.data_type, raw)?;
                    store.set_attribute_value(created.id, item.id, &value)?;
                }
                for point in &asset.historian {
                    let item = find(&point.attribute)?;
                    let value = coerce_attribute_value(item.data_type, &point.value)?;
                    let ts = Timestamp::from_value(&point.ts)?;
                    store.write_historian(created.id, item.id, ts, &value)?;
                    summary.points += 1;
                }

                next.extend(asset.children.iter().map(|c| (Some(created.id), c)));
            }
            pending = next;
        }

        let mut script_templates = HashMap::new();
        for template in &self.script_templates {
            let created =
                store.save_script_template(&template.name, &template.script, template.inputs.clone())?;
            script_templates.insert(template.name.as_str(), created.id);
        }
        for script in &self.scripts {
            let template_id = match &script.template {
                Some(name) => Some(
                    *script_templates
                        .get(name.as_str())
                        .ok_or_else(|| SeedError::UnknownTemplate(name.clone()))?,
                ),
                None => None,
            };
            store.save_script(NewScript {
                name: script.name.clone(),
                script: script.script.clone(),
                inputs: script.inputs.clone(),
                template_id,
            })?;
            debug!(script = %script.name, "seeded analysis script");
            summary.scripts += 1;
        }

        info!(
            templates = summary.templates,
            assets = summary.assets,
            points = summary.points,
            scripts = summary.scripts,
            "seed applied"
        );
        Ok(summary)
    }
}
