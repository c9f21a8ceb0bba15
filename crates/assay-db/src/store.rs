//! Database store wrapper.

use crate::error::{Error, Result};
use crate::models::*;
use assay_core::{
    AnalysisScript, AnalysisScriptTemplate, Asset, AssetId, Attribute, AttributeId,
    AttributeTemplate, BindingSpec, DataType, HistorianPoint, ScriptId, ScriptTemplateId,
    TemplateId, TemplateItem, TemplateItemId, Timestamp, Value,
};
use native_db::transaction::RwTransaction;
use native_db::*;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

// Static models for the database
static MODELS: OnceLock<Models> = OnceLock::new();

fn models() -> Result<&'static Models> {
    if let Some(models) = MODELS.get() {
        return Ok(models);
    }
    let mut models = Models::new();
    models.define::<StoredAsset>()?;
    models.define::<StoredTemplate>()?;
    models.define::<StoredTemplateItem>()?;
    models.define::<StoredAttribute>()?;
    models.define::<StoredHistorianPoint>()?;
    models.define::<StoredScript>()?;
    models.define::<StoredScriptTemplate>()?;
    models.define::<StoredSequence>()?;
    Ok(MODELS.get_or_init(|| models))
}

/// Collect a native_db scan into a Vec.
pub(crate) fn collect<T>(
    iter: impl Iterator<Item = std::result::Result<T, native_db::db_type::Error>>,
) -> Result<Vec<T>> {
    iter.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Allocate the next id of a sequence inside a write transaction.
fn next_id(rw: &RwTransaction<'_>, sequence: &str) -> Result<u64> {
    let last = rw
        .get()
        .primary::<StoredSequence>(sequence.to_string())?
        .map(|s| s.last)
        .unwrap_or(0);
    let next = last + 1;
    rw.upsert(StoredSequence {
        name: sequence.to_string(),
        last: next,
    })?;
    Ok(next)
}

/// Fields of an asset to create.
#[derive(Debug, Clone, Default)]
pub struct NewAsset {
    pub name: String,
    pub description: Option<String>,
    pub parent_asset_id: Option<AssetId>,
    pub template_id: Option<TemplateId>,
}

/// Fields of a template item to create.
#[derive(Debug, Clone)]
pub struct NewTemplateItem {
    pub name: String,
    pub data_type: DataType,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub default_value: Value,
}

/// Fields of an analysis script to create.
#[derive(Debug, Clone, Default)]
pub struct NewScript {
    pub name: String,
    pub script: String,
    pub inputs: Vec<BindingSpec>,
    pub template_id: Option<ScriptTemplateId>,
}

/// Database store for assets, attributes, historian points and scripts.
pub struct Store {
    pub(crate) db: Database<'static>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new()
            .create(models()?, path.as_ref())
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Create an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(models()?)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Create an attribute template with no items.
    pub fn create_template(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<AttributeTemplate> {
        let rw = self.db.rw_transaction()?;
        let stored = StoredTemplate {
            id: next_id(&rw, "template")?,
            name: name.to_string(),
            description,
        };
        rw.insert(stored.clone())?;
        rw.commit()?;
        Ok(stored.to_template())
    }

    /// Append an item to a template.
    ///
    /// Every asset already using the template gets an attribute seeded with
    /// the item's default value.
    pub fn add_template_item(
        &self,
        template_id: TemplateId,
        item: NewTemplateItem,
    ) -> Result<TemplateItem> {
        let rw = self.db.rw_transaction()?;
        if rw.get().primary::<StoredTemplate>(template_id.raw())?.is_none() {
            return Err(Error::NotFound(template_id.to_string()));
        }

        let siblings: Vec<StoredTemplateItem> = {
            let scan = rw
                .scan()
                .secondary::<StoredTemplateItem>(StoredTemplateItemKey::template_id)?;
            let iter = scan.start_with(template_id.raw())?;
            collect(iter)?
        };
        if siblings.iter().any(|s| s.name == item.name) {
            return Err(Error::DuplicateKey(format!(
                "{} already has an item named {}",
                template_id, item.name
            )));
        }

        let created = TemplateItem {
            id: TemplateItemId(next_id(&rw, "template_item")?),
            template_id,
            name: item.name,
            data_type: item.data_type,
            unit: item.unit,
            description: item.description,
            default_value: item.default_value,
            position: siblings.len() as u32,
        };
        rw.insert(StoredTemplateItem::from_item(&created)?)?;

        let assets: Vec<StoredAsset> = collect(rw.scan().primary::<StoredAsset>()?.all()?)?;
        for asset in assets
            .iter()
            .filter(|a| a.template_id == Some(template_id.raw()))
        {
            let id = AttributeId(next_id(&rw, "attribute")?);
            rw.insert(StoredAttribute::new(
                id,
                AssetId(asset.id),
                created.id,
                &created.default_value,
            )?)?;
        }

        rw.commit()?;
        Ok(created)
    }

    /// Delete a template item with its attributes and their historian points.
    pub fn delete_template_item(&self, id: TemplateItemId) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        let item = rw
            .get()
            .primary::<StoredTemplateItem>(id.raw())?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let attributes: Vec<StoredAttribute> = {
            let scan = rw
                .scan()
                .secondary::<StoredAttribute>(StoredAttributeKey::template_item_id)?;
            let iter = scan.start_with(id.raw())?;
            collect(iter)?
        };
        for attribute in attributes {
            remove_attribute(&rw, attribute)?;
        }
        rw.remove(item)?;
        rw.commit()?;
        Ok(())
    }

    /// Create an asset.
    ///
    /// With a template, one attribute per template item is seeded with the
    /// item's default value.
    pub fn create_asset(&self, asset: NewAsset) -> Result<Asset> {
        let rw = self.db.rw_transaction()?;
        if let Some(parent) = asset.parent_asset_id {
            if rw.get().primary::<StoredAsset>(parent.raw())?.is_none() {
                return Err(Error::NotFound(parent.to_string()));
            }
        }
        let items: Vec<StoredTemplateItem> = match asset.template_id {
            Some(template_id) => {
                if rw.get().primary::<StoredTemplate>(template_id.raw())?.is_none() {
                    return Err(Error::NotFound(template_id.to_string()));
                }
                let scan = rw
                    .scan()
                    .secondary::<StoredTemplateItem>(StoredTemplateItemKey::template_id)?;
                let iter = scan.start_with(template_id.raw())?;
                collect(iter)?
            }
            None => Vec::new(),
        };

        let created = Asset {
            id: AssetId(next_id(&rw, "asset")?),
            name: asset.name,
            description: asset.description,
            parent_asset_id: asset.parent_asset_id,
            template_id: asset.template_id,
        };
        rw.insert(StoredAsset::from_asset(&created))?;

        for item in items {
            let item = item.to_item()?;
            let id = AttributeId(next_id(&rw, "attribute")?);
            rw.insert(StoredAttribute::new(
                id,
                created.id,
                item.id,
                &item.default_value,
            )?)?;
        }

        rw.commit()?;
        debug!(asset = %created.id, name = %created.name, "created asset");
        Ok(created)
    }

    /// Delete an asset and everything below it.
    ///
    /// Descendant assets, their attributes and the attributes' historian
    /// points go with it.
    pub fn delete_asset(&self, id: AssetId) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        let assets: Vec<StoredAsset> = collect(rw.scan().primary::<StoredAsset>()?.all()?)?;
        if !assets.iter().any(|a| a.id == id.raw()) {
            return Err(Error::NotFound(id.to_string()));
        }

        let mut doomed = HashSet::new();
        let mut frontier = VecDeque::from([id.raw()]);
        while let Some(current) = frontier.pop_front() {
            if !doomed.insert(current) {
                continue;
            }
            frontier.extend(
                assets
                    .iter()
                    .filter(|a| a.parent_id == Some(current))
                    .map(|a| a.id),
            );
        }

        for asset in assets.into_iter().filter(|a| doomed.contains(&a.id)) {
            let attributes: Vec<StoredAttribute> = {
                let scan = rw
                    .scan()
                    .secondary::<StoredAttribute>(StoredAttributeKey::asset_id)?;
                let iter = scan.start_with(asset.id)?;
                collect(iter)?
            };
            for attribute in attributes {
                remove_attribute(&rw, attribute)?;
            }
            rw.remove(asset)?;
        }

        rw.commit()?;
        debug!(asset = %id, removed = doomed.len(), "deleted asset subtree");
        Ok(())
    }

    /// Set an attribute's live value, creating the row if absent.
    pub fn set_attribute_value(
        &self,
        asset_id: AssetId,
        template_item_id: TemplateItemId,
        value: &Value,
    ) -> Result<Attribute> {
        let rw = self.db.rw_transaction()?;
        let stored = upsert_attribute(&rw, asset_id, template_item_id, value)?;
        rw.commit()?;
        stored.to_attribute()
    }

    /// Record a historian point and make it the attribute's live value.
    ///
    /// Both rows change in one transaction. A point already stored at `ts`
    /// is replaced.
    pub fn write_historian(
        &self,
        asset_id: AssetId,
        template_item_id: TemplateItemId,
        ts: Timestamp,
        value: &Value,
    ) -> Result<HistorianPoint> {
        let rw = self.db.rw_transaction()?;
        let attribute = upsert_attribute(&rw, asset_id, template_item_id, value)?;
        let attribute_id = AttributeId(attribute.id);

        let point = StoredHistorianPoint::new(attribute_id, ts, value)?;
        match rw
            .get()
            .primary::<StoredHistorianPoint>(point.key.clone())?
        {
            Some(old) => rw.update(old, point.clone())?,
            None => rw.insert(point.clone())?,
        }
        rw.commit()?;
        point.to_point()
    }

    /// Create a script template.
    pub fn save_script_template(
        &self,
        name: &str,
        script: &str,
        inputs: Vec<BindingSpec>,
    ) -> Result<AnalysisScriptTemplate> {
        let rw = self.db.rw_transaction()?;
        let template = AnalysisScriptTemplate {
            id: ScriptTemplateId(next_id(&rw, "script_template")?),
            name: name.to_string(),
            script: script.to_string(),
            inputs,
        };
        rw.insert(StoredScriptTemplate::from_template(&template)?)?;
        rw.commit()?;
        Ok(template)
    }

    /// Create an analysis script; names are unique.
    pub fn save_script(&self, script: NewScript) -> Result<AnalysisScript> {
        let rw = self.db.rw_transaction()?;
        let taken = rw
            .get()
            .secondary::<StoredScript>(StoredScriptKey::name, script.name.clone())?;
        if taken.is_some() {
            return Err(Error::DuplicateKey(format!("script {}", script.name)));
        }
        if let Some(template_id) = script.template_id {
            if rw
                .get()
                .primary::<StoredScriptTemplate>(template_id.raw())?
                .is_none()
            {
                return Err(Error::NotFound(template_id.to_string()));
            }
        }

        let created = AnalysisScript {
            id: ScriptId(next_id(&rw, "script")?),
            name: script.name,
            script: script.script,
            inputs: script.inputs,
            template_id: script.template_id,
        };
        rw.insert(StoredScript::from_script(&created)?)?;
        rw.commit()?;
        Ok(created)
    }
}

/// Insert or update the attribute row for `(asset, item)`.
fn upsert_attribute(
    rw: &RwTransaction<'_>,
    asset_id: AssetId,
    template_item_id: TemplateItemId,
    value: &Value,
) -> Result<StoredAttribute> {
    let slot = StoredAttribute::slot_key(asset_id, template_item_id);
    let existing = rw
        .get()
        .secondary::<StoredAttribute>(StoredAttributeKey::slot, slot)?;
    match existing {
        Some(old) => {
            let updated = StoredAttribute::new(AttributeId(old.id), asset_id, template_item_id, value)?;
            rw.update(old, updated.clone())?;
            Ok(updated)
        }
        None => {
            let id = AttributeId(next_id(rw, "attribute")?);
            let created = StoredAttribute::new(id, asset_id, template_item_id, value)?;
            rw.insert(created.clone())?;
            Ok(created)
        }
    }
}

/// Remove an attribute row and its historian points.
fn remove_attribute(rw: &RwTransaction<'_>, attribute: StoredAttribute) -> Result<()> {
    let points: Vec<StoredHistorianPoint> = {
        let scan = rw
            .scan()
            .secondary::<StoredHistorianPoint>(StoredHistorianPointKey::attribute_id)?;
        let iter = scan.start_with(attribute.id)?;
        collect(iter)?
    };
    for point in points {
        rw.remove(point)?;
    }
    rw.remove(attribute)?;
    Ok(())
}
