//! Read-only asset data exposed to scripts
//!
//! Scripts look assets and attributes up by path:
//!
//! ```rhai
//! let pump = Asset::get("Plant A.Pump-01");
//! let p = Attribute::get("Plant A.Pump-01.pressure");
//! p.value * 2
//! ```
//!
//! `get_asset_by_path` and `get_attribute_by_path` are flat aliases. Unknown
//! paths return `()`. Every lookup returns a fresh copy.

use crate::convert::to_dynamic;
use assay_core::{IndexMap, Value};
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Module};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Immutable path-keyed view of every asset and attribute
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroSnapshot {
    /// Asset path → `{id, name, description, parentAssetId, templateId}`
    pub assets_by_path: IndexMap<String, Value>,
    /// `"{assetPath}.{itemName}"` → `{assetId, templateItemId, attributeId, name, dataType, unit, value, path}`
    pub attributes_by_path: IndexMap<String, Value>,
}

impl MacroSnapshot {
    /// Look up an asset record by path
    pub fn asset(&self, path: &str) -> Option<&Value> {
        self.assets_by_path.get(path)
    }

    /// Look up an attribute record by tag path
    pub fn attribute(&self, path: &str) -> Option<&Value> {
        self.attributes_by_path.get(path)
    }
}

/// The snapshot a runtime's accessors currently read from
pub(crate) type SnapshotSlot = Rc<RefCell<Option<Arc<MacroSnapshot>>>>;

#[derive(Clone, Copy)]
enum Table {
    Assets,
    Attributes,
}

fn lookup(slot: &SnapshotSlot, table: Table, path: &str) -> Dynamic {
    let guard = slot.borrow();
    let Some(snapshot) = guard.as_ref() else {
        return Dynamic::UNIT;
    };
    let found = match table {
        Table::Assets => snapshot.asset(path),
        Table::Attributes => snapshot.attribute(path),
    };
    found.map(to_dynamic).unwrap_or(Dynamic::UNIT)
}

fn accessor_module(slot: &SnapshotSlot, table: Table) -> Module {
    let slot = Rc::clone(slot);
    let mut module = Module::new();
    module.set_native_fn(
        "get",
        move |path: ImmutableString| -> Result<Dynamic, Box<EvalAltResult>> {
            Ok(lookup(&slot, table, &path))
        },
    );
    module
}

/// Register `Asset::get`, `Attribute::get` and the flat aliases
pub(crate) fn install(engine: &mut Engine, slot: &SnapshotSlot) {
    engine.register_static_module("Asset", accessor_module(slot, Table::Assets).into());
    engine.register_static_module("Attribute", accessor_module(slot, Table::Attributes).into());

    let assets = Rc::clone(slot);
    engine.register_fn("get_asset_by_path", move |path: ImmutableString| {
        lookup(&assets, Table::Assets, &path)
    });
    let attributes = Rc::clone(slot);
    engine.register_fn("get_attribute_by_path", move |path: ImmutableString| {
        lookup(&attributes, Table::Attributes, &path)
    });
}
