//! Asset and template models for database storage.

use crate::error::Result;
use assay_core::{
    Asset, AssetId, AttributeTemplate, DataType, TemplateId, TemplateItem, TemplateItemId, Value,
};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// Stored asset in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct StoredAsset {
    /// Primary key - asset ID, allocated in creation order.
    #[primary_key]
    pub id: u64,
    /// Display name; one segment of a tag path.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Parent asset, `None` for roots.
    pub parent_id: Option<u64>,
    /// Attribute template.
    pub template_id: Option<u64>,
}

impl StoredAsset {
    /// Create from an Asset.
    pub fn from_asset(asset: &Asset) -> Self {
        Self {
            id: asset.id.raw(),
            name: asset.name.clone(),
            description: asset.description.clone(),
            parent_id: asset.parent_asset_id.map(|p| p.raw()),
            template_id: asset.template_id.map(|t| t.raw()),
        }
    }

    /// Convert to an Asset.
    pub fn to_asset(&self) -> Asset {
        Asset {
            id: AssetId(self.id),
            name: self.name.clone(),
            description: self.description.clone(),
            parent_asset_id: self.parent_id.map(AssetId),
            template_id: self.template_id.map(TemplateId),
        }
    }
}

/// Stored attribute template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct StoredTemplate {
    #[primary_key]
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
}

impl StoredTemplate {
    /// Convert to an AttributeTemplate.
    pub fn to_template(&self) -> AttributeTemplate {
        AttributeTemplate {
            id: TemplateId(self.id),
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Stored template item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct StoredTemplateItem {
    /// Primary key - template item ID.
    #[primary_key]
    pub id: u64,
    /// Owning template.
    #[secondary_key]
    pub template_id: u64,
    /// Item name, unique within the template.
    pub name: String,
    /// Declared data type (uppercase name).
    pub data_type: String,
    /// Unit of measure.
    pub unit: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Serialized default value.
    pub default_value: Vec<u8>,
    /// Position within the template.
    pub position: u32,
}

impl StoredTemplateItem {
    /// Create from a TemplateItem.
    pub fn from_item(item: &TemplateItem) -> Result<Self> {
        Ok(Self {
            id: item.id.raw(),
            template_id: item.template_id.raw(),
            name: item.name.clone(),
            data_type: item.data_type.as_str().to_string(),
            unit: item.unit.clone(),
            description: item.description.clone(),
            default_value: bincode::serialize(&item.default_value)?,
            position: item.position,
        })
    }

    /// Convert to a TemplateItem.
    ///
    /// An unrecognized stored data type reads back as STRING.
    pub fn to_item(&self) -> Result<TemplateItem> {
        let default_value: Value = bincode::deserialize(&self.default_value)?;
        Ok(TemplateItem {
            id: TemplateItemId(self.id),
            template_id: TemplateId(self.template_id),
            name: self.name.clone(),
            data_type: self.data_type.parse::<DataType>().unwrap_or_default(),
            unit: self.unit.clone(),
            description: self.description.clone(),
            default_value,
            position: self.position,
        })
    }
}

/// Id allocator row, one per record kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 9, version = 1)]
#[native_db]
pub struct StoredSequence {
    /// Sequence name, e.g. "asset".
    #[primary_key]
    pub name: String,
    /// Last id handed out.
    pub last: u64,
}
