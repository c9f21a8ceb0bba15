//! Path Resolver - dotted paths to assets and attribute slots
//!
//! Asset names are only unique among siblings, so a path is resolved by
//! walking down from the roots one segment at a time. The parent → children
//! index is built once per analysis run and reused for every lookup in it.
//!
//! When two siblings share a name the first one in storage order wins.

use crate::error::Result;
use assay_core::{
    path, Asset, AssetId, AttributeId, DataType, Error as CoreError, TagPath, TemplateItemId,
};
use assay_db::Store;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Every asset, indexed by id and by parent
#[derive(Debug, Clone, Default)]
pub struct AssetIndex {
    assets: Vec<Asset>,
    by_id: HashMap<AssetId, usize>,
    children: HashMap<Option<AssetId>, Vec<usize>>,
}

impl AssetIndex {
    /// Load every asset from storage
    pub fn load(store: &Store) -> Result<Self> {
        Ok(Self::from_assets(store.load_all_assets()?))
    }

    /// Build the index from assets in storage order
    pub fn from_assets(assets: Vec<Asset>) -> Self {
        let mut by_id = HashMap::with_capacity(assets.len());
        let mut children: HashMap<Option<AssetId>, Vec<usize>> = HashMap::new();
        for (i, asset) in assets.iter().enumerate() {
            by_id.insert(asset.id, i);
            children.entry(asset.parent_asset_id).or_default().push(i);
        }
        Self {
            assets,
            by_id,
            children,
        }
    }

    /// Number of assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// All assets in storage order
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn get(&self, id: AssetId) -> Option<&Asset> {
        self.by_id.get(&id).map(|&i| &self.assets[i])
    }

    /// Children of `parent` (`None` for roots) named `name`; first match wins
    fn child_named(&self, parent: Option<AssetId>, name: &str) -> Option<&Asset> {
        self.children
            .get(&parent)?
            .iter()
            .map(|&i| &self.assets[i])
            .find(|a| a.name == name)
    }

    /// Walk segments from the roots
    ///
    /// Returns the asset and its hierarchy, root first and the asset last.
    pub fn resolve_asset_path(&self, segments: &[String]) -> Result<(&Asset, Vec<&Asset>)> {
        let not_found = || CoreError::PathNotFound(segments.join("."));
        if segments.is_empty() {
            return Err(not_found().into());
        }

        let mut parent = None;
        let mut hierarchy = Vec::with_capacity(segments.len());
        for segment in segments {
            let asset = self.child_named(parent, segment).ok_or_else(not_found)?;
            hierarchy.push(asset);
            parent = Some(asset.id);
        }
        let asset = hierarchy[hierarchy.len() - 1];
        Ok((asset, hierarchy))
    }

    /// The dotted path of an asset, walking parent links up to a root
    ///
    /// A dangling parent link ends the walk. A cycle yields `None`.
    pub fn path_of(&self, id: AssetId) -> Option<String> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get(id);
        while let Some(asset) = current {
            if !seen.insert(asset.id) {
                return None;
            }
            names.push(asset.name.as_str());
            current = asset.parent_asset_id.and_then(|p| self.get(p));
        }
        if names.is_empty() {
            return None;
        }
        names.reverse();
        Some(names.join("."))
    }
}

/// Where a tag path points
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagResolution {
    pub asset_id: AssetId,
    pub template_item_id: TemplateItemId,
    /// `None` when the asset has no attribute row for this item yet
    pub attribute_id: Option<AttributeId>,
    pub data_type: DataType,
    pub unit: Option<String>,
}

/// Resolves paths against one asset index
///
/// Cheap to clone; clones share the store and the index.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<Store>,
    index: Arc<AssetIndex>,
}

impl Resolver {
    /// Build a resolver over a fresh asset index
    pub fn load(store: Arc<Store>) -> Result<Self> {
        let index = AssetIndex::load(&store)?;
        Ok(Self {
            store,
            index: Arc::new(index),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn index(&self) -> &AssetIndex {
        &self.index
    }

    /// Resolve a dotted asset path
    pub fn resolve_asset_path(&self, asset_path: &str) -> Result<(&Asset, Vec<&Asset>)> {
        self.index.resolve_asset_path(&path::segments(asset_path))
    }

    /// Resolve a tag path to its asset, template item and attribute row
    pub fn resolve_tag_path(&self, tag_path: &str) -> Result<TagResolution> {
        let tag = TagPath::parse(tag_path)?;
        let (asset, _) = self.index.resolve_asset_path(tag.asset_segments())?;
        let template_id = asset
            .template_id
            .ok_or_else(|| CoreError::NoTemplate(tag.asset_path()))?;
        let item = self
            .store
            .find_template_item(template_id, tag.attribute_name())?
            .ok_or_else(|| CoreError::AttributeNotFound(tag.to_string()))?;
        let attribute = self.store.find_attribute(asset.id, item.id)?;

        Ok(TagResolution {
            asset_id: asset.id,
            template_item_id: item.id,
            attribute_id: attribute.map(|a| a.id),
            data_type: item.data_type,
            unit: item.unit,
        })
    }
}
