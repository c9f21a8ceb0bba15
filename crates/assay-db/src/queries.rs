//! Common query patterns for the database.

use crate::error::Result;
use crate::models::*;
use crate::store::{collect, Store};
use assay_core::{
    AnalysisScript, AnalysisScriptTemplate, Asset, AssetId, Attribute, AttributeId,
    AttributeTemplate, HistorianPoint, ScriptTemplateId, TemplateId, TemplateItem,
    TemplateItemId, Timestamp,
};

impl Store {
    /// Load all assets in storage order.
    pub fn load_all_assets(&self) -> Result<Vec<Asset>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredAsset>()?;
        let iter = scan.all()?;
        let assets = collect(iter)?;
        Ok(assets.iter().map(StoredAsset::to_asset).collect())
    }

    /// Load an asset by ID.
    pub fn get_asset(&self, id: AssetId) -> Result<Option<Asset>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredAsset> = r.get().primary(id.raw())?;
        Ok(stored.map(|s| s.to_asset()))
    }

    /// Load an attribute template by ID.
    pub fn get_template(&self, id: TemplateId) -> Result<Option<AttributeTemplate>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredTemplate> = r.get().primary(id.raw())?;
        Ok(stored.map(|s| s.to_template()))
    }

    /// Items of a template, in template order.
    pub fn template_items(&self, template_id: TemplateId) -> Result<Vec<TemplateItem>> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredTemplateItem>(StoredTemplateItemKey::template_id)?;
        let iter = scan.start_with(template_id.raw())?;
        let stored = collect(iter)?;
        let mut items = stored
            .iter()
            .map(StoredTemplateItem::to_item)
            .collect::<Result<Vec<_>>>()?;
        items.sort_by_key(|item| item.position);
        Ok(items)
    }

    /// Load every template item.
    pub fn load_all_template_items(&self) -> Result<Vec<TemplateItem>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredTemplateItem>()?;
        let iter = scan.all()?;
        let stored = collect(iter)?;
        stored.iter().map(StoredTemplateItem::to_item).collect()
    }

    /// Load a template item by ID.
    pub fn get_template_item(&self, id: TemplateItemId) -> Result<Option<TemplateItem>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredTemplateItem> = r.get().primary(id.raw())?;
        stored.map(|s| s.to_item()).transpose()
    }

    /// Find a template item by name within a template.
    pub fn find_template_item(
        &self,
        template_id: TemplateId,
        name: &str,
    ) -> Result<Option<TemplateItem>> {
        Ok(self
            .template_items(template_id)?
            .into_iter()
            .find(|item| item.name == name))
    }

    /// Load every attribute.
    pub fn load_all_attributes(&self) -> Result<Vec<Attribute>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredAttribute>()?;
        let iter = scan.all()?;
        let stored = collect(iter)?;
        stored.iter().map(StoredAttribute::to_attribute).collect()
    }

    /// Attributes of one asset.
    pub fn attributes_of_asset(&self, asset_id: AssetId) -> Result<Vec<Attribute>> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredAttribute>(StoredAttributeKey::asset_id)?;
        let iter = scan.start_with(asset_id.raw())?;
        let stored = collect(iter)?;
        stored.iter().map(StoredAttribute::to_attribute).collect()
    }

    /// Find the attribute for an asset and template item.
    pub fn find_attribute(
        &self,
        asset_id: AssetId,
        template_item_id: TemplateItemId,
    ) -> Result<Option<Attribute>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredAttribute> = r.get().secondary(
            StoredAttributeKey::slot,
            StoredAttribute::slot_key(asset_id, template_item_id),
        )?;
        stored.map(|s| s.to_attribute()).transpose()
    }

    /// Historian points of an attribute with `start <= ts <= end`, ascending.
    pub fn historian_range(
        &self,
        attribute_id: AttributeId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<HistorianPoint>> {
        if start > end {
            return Ok(Vec::new());
        }
        let r = self.db.r_transaction()?;
        let from = StoredHistorianPoint::point_key(attribute_id, start);
        let to = StoredHistorianPoint::point_key(attribute_id, end);
        let stored = collect(r.scan().primary::<StoredHistorianPoint>()?.range(from..=to)?)?;
        stored.iter().map(StoredHistorianPoint::to_point).collect()
    }

    /// Find an analysis script by its unique name.
    pub fn find_script_by_name(&self, name: &str) -> Result<Option<AnalysisScript>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredScript> =
            r.get().secondary(StoredScriptKey::name, name.to_string())?;
        stored.map(|s| s.to_script()).transpose()
    }

    /// Load a script template by ID.
    pub fn get_script_template(
        &self,
        id: ScriptTemplateId,
    ) -> Result<Option<AnalysisScriptTemplate>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredScriptTemplate> = r.get().primary(id.raw())?;
        stored.map(|s| s.to_template()).transpose()
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{NewAsset, NewTemplateItem};
    use crate::Store;
    use assay_core::{DataType, Timestamp, Value};

    #[test]
    fn test_historian_range_bounds_and_order() {
        let store = Store::in_memory().unwrap();
        let template = store.create_template("Meter", None).unwrap();
        let flow = store
            .add_template_item(
                template.id,
                NewTemplateItem {
                    name: "flow".into(),
                    data_type: DataType::Number,
                    unit: Some("m3/h".into()),
                    description: None,
                    default_value: Value::Null,
                },
            )
            .unwrap();
        let meter = store
            .create_asset(NewAsset {
                name: "M1".into(),
                template_id: Some(template.id),
                ..Default::default()
            })
            .unwrap();
        let other = store
            .create_asset(NewAsset {
                name: "M2".into(),
                template_id: Some(template.id),
                ..Default::default()
            })
            .unwrap();
        for ts in [25, -3, 15] {
            store
                .write_historian(other.id, flow.id, Timestamp(ts), &Value::Int(ts))
                .unwrap();
        }
        for ts in [30, 10, -7, 20, 9, 31, 40] {
            store
                .write_historian(meter.id, flow.id, Timestamp(ts), &Value::Int(ts))
                .unwrap();
        }

        let attribute = store.find_attribute(meter.id, flow.id).unwrap().unwrap();
        let points = store
            .historian_range(attribute.id, Timestamp(10), Timestamp(30))
            .unwrap();
        let stamps: Vec<i64> = points.iter().map(|p| p.ts).collect();
        assert_eq!(stamps, vec![10, 20, 30]);
        assert!(points.iter().all(|p| p.attribute_id == attribute.id));
        // live value follows the latest write
        assert_eq!(attribute.value, Value::Int(40));

        let points = store
            .historian_range(attribute.id, Timestamp(-10), Timestamp(9))
            .unwrap();
        let stamps: Vec<i64> = points.iter().map(|p| p.ts).collect();
        assert_eq!(stamps, vec![-7, 9]);

        assert!(store
            .historian_range(attribute.id, Timestamp(30), Timestamp(10))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_find_template_item_by_name() {
        let store = Store::in_memory().unwrap();
        let template = store.create_template("Pump", None).unwrap();
        for name in ["pressure", "speed"] {
            store
                .add_template_item(
                    template.id,
                    NewTemplateItem {
                        name: name.into(),
                        data_type: DataType::Number,
                        unit: None,
                        description: None,
                        default_value: Value::Null,
                    },
                )
                .unwrap();
        }
        let speed = store.find_template_item(template.id, "speed").unwrap().unwrap();
        assert_eq!(speed.position, 1);
        assert!(store.find_template_item(template.id, "flow").unwrap().is_none());
    }
}
