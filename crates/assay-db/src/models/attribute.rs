//! Attribute models for database storage.

use crate::error::Result;
use assay_core::{AssetId, Attribute, AttributeId, TemplateItemId, Value};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// Stored attribute: the live value of one template item on one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 4, version = 1)]
#[native_db]
pub struct StoredAttribute {
    /// Primary key - attribute ID.
    #[primary_key]
    pub id: u64,
    /// `"{asset}:{item}"`, unique per asset and template item.
    #[secondary_key(unique)]
    pub slot: String,
    /// Owning asset.
    #[secondary_key]
    pub asset_id: u64,
    /// Template item this attribute instantiates.
    #[secondary_key]
    pub template_item_id: u64,
    /// Serialized live value.
    pub value: Vec<u8>,
}

impl StoredAttribute {
    /// The unique slot key for an asset and template item.
    pub fn slot_key(asset_id: AssetId, template_item_id: TemplateItemId) -> String {
        format!("{}:{}", asset_id.raw(), template_item_id.raw())
    }

    /// Create a row for a new or updated attribute.
    pub fn new(
        id: AttributeId,
        asset_id: AssetId,
        template_item_id: TemplateItemId,
        value: &Value,
    ) -> Result<Self> {
        Ok(Self {
            id: id.raw(),
            slot: Self::slot_key(asset_id, template_item_id),
            asset_id: asset_id.raw(),
            template_item_id: template_item_id.raw(),
            value: bincode::serialize(value)?,
        })
    }

    /// Convert to an Attribute.
    pub fn to_attribute(&self) -> Result<Attribute> {
        Ok(Attribute {
            id: AttributeId(self.id),
            asset_id: AssetId(self.asset_id),
            template_item_id: TemplateItemId(self.template_item_id),
            value: bincode::deserialize(&self.value)?,
        })
    }
}
