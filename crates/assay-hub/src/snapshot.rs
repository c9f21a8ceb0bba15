//! Macro snapshot construction
//!
//! Flattens the asset tree into path-keyed records scripts can read through
//! `Asset::get` and `Attribute::get`. The snapshot is built once per run and
//! shared read-only with the runtime that executes it.

use crate::error::Result;
use crate::resolve::AssetIndex;
use assay_core::{Asset, Attribute, AssetId, TemplateItem, TemplateItemId, Value, ValueMap};
use assay_db::Store;
use assay_script::MacroSnapshot;
use std::collections::HashMap;
use tracing::debug;

fn asset_record(asset: &Asset, path: &str) -> Value {
    let mut map = ValueMap::new();
    map.insert("id".into(), asset.id.raw().into());
    map.insert("name".into(), asset.name.as_str().into());
    map.insert("description".into(), asset.description.clone().into());
    map.insert(
        "parentAssetId".into(),
        asset.parent_asset_id.map(|p| p.raw()).into(),
    );
    map.insert("templateId".into(), asset.template_id.map(|t| t.raw()).into());
    map.insert("path".into(), path.into());
    Value::Map(map)
}

fn attribute_record(attribute: &Attribute, item: &TemplateItem, path: String) -> Value {
    let mut map = ValueMap::new();
    map.insert("assetId".into(), attribute.asset_id.raw().into());
    map.insert("templateItemId".into(), item.id.raw().into());
    map.insert("attributeId".into(), attribute.id.raw().into());
    map.insert("name".into(), item.name.as_str().into());
    map.insert("dataType".into(), item.data_type.as_str().into());
    map.insert("unit".into(), item.unit.clone().into());
    map.insert("value".into(), attribute.value.clone());
    map.insert("path".into(), path.into());
    Value::Map(map)
}

/// Build the snapshot from the current asset index and storage
///
/// Assets whose parent chain loops are left out. Where two assets share a
/// path the first in storage order is kept, matching path resolution.
pub fn build_macro_snapshot(store: &Store, index: &AssetIndex) -> Result<MacroSnapshot> {
    let items: HashMap<TemplateItemId, TemplateItem> = store
        .load_all_template_items()?
        .into_iter()
        .map(|item| (item.id, item))
        .collect();

    let mut attributes: HashMap<AssetId, Vec<Attribute>> = HashMap::new();
    for attribute in store.load_all_attributes()? {
        attributes.entry(attribute.asset_id).or_default().push(attribute);
    }

    let mut snapshot = MacroSnapshot::default();
    for asset in index.assets() {
        let Some(path) = index.path_of(asset.id) else {
            continue;
        };
        if snapshot.assets_by_path.contains_key(&path) {
            continue;
        }

        let mut owned: Vec<(&Attribute, &TemplateItem)> = attributes
            .get(&asset.id)
            .into_iter()
            .flatten()
            .filter_map(|a| items.get(&a.template_item_id).map(|item| (a, item)))
            .collect();
        owned.sort_by_key(|(_, item)| item.position);

        for (attribute, item) in owned {
            let tag = format!("{}.{}", path, item.name);
            snapshot
                .attributes_by_path
                .entry(tag.clone())
                .or_insert_with(|| attribute_record(attribute, item, tag));
        }
        snapshot
            .assets_by_path
            .insert(path.clone(), asset_record(asset, &path));
    }

    debug!(
        assets = snapshot.assets_by_path.len(),
        attributes = snapshot.attributes_by_path.len(),
        "built macro snapshot"
    );
    Ok(snapshot)
}
