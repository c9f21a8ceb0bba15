//! Shared fixtures for unit tests

use assay_core::{Asset, DataType, TemplateItem, Value};
use assay_db::{NewAsset, NewTemplateItem, Store};
use std::sync::Arc;

pub(crate) struct Plant {
    pub store: Arc<Store>,
    pub plant: Asset,
    pub pump: Asset,
    pub pressure: TemplateItem,
    pub temperature: TemplateItem,
    pub speed: TemplateItem,
    pub metadata: TemplateItem,
}

fn item(name: &str, data_type: DataType, unit: Option<&str>, default: Value) -> NewTemplateItem {
    NewTemplateItem {
        name: name.to_string(),
        data_type,
        unit: unit.map(str::to_string),
        description: None,
        default_value: default,
    }
}

/// `Plant A` (no template) with child `Pump-01` (Pump template)
pub(crate) fn plant() -> Plant {
    let store = Store::in_memory().unwrap();
    let template = store.create_template("Pump", None).unwrap();
    let pressure = store
        .add_template_item(template.id, item("pressure", DataType::Number, Some("bar"), Value::Null))
        .unwrap();
    let temperature = store
        .add_template_item(template.id, item("temperature", DataType::Number, Some("°C"), Value::Null))
        .unwrap();
    let speed = store
        .add_template_item(template.id, item("speed", DataType::Number, Some("rpm"), Value::Null))
        .unwrap();
    let metadata = store
        .add_template_item(template.id, item("metadata", DataType::Object, None, Value::Null))
        .unwrap();

    let plant = store
        .create_asset(NewAsset {
            name: "Plant A".into(),
            ..Default::default()
        })
        .unwrap();
    let pump = store
        .create_asset(NewAsset {
            name: "Pump-01".into(),
            parent_asset_id: Some(plant.id),
            template_id: Some(template.id),
            ..Default::default()
        })
        .unwrap();

    store
        .set_attribute_value(pump.id, pressure.id, &Value::Float(6.5))
        .unwrap();
    store
        .set_attribute_value(pump.id, temperature.id, &Value::Int(80))
        .unwrap();
    store
        .set_attribute_value(pump.id, speed.id, &Value::Int(1450))
        .unwrap();

    Plant {
        store: Arc::new(store),
        plant,
        pump,
        pressure,
        temperature,
        speed,
        metadata,
    }
}
