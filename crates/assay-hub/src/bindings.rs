//! Binding Resolver - script inputs to concrete values
//!
//! Inputs are resolved in declaration order and the first failure aborts
//! the run. Blank variable names are skipped. Two different names that
//! become the same script variable (`$x` and `_x`) are rejected.

use crate::error::Result;
use crate::resolve::Resolver;
use std::collections::HashMap;
use assay_core::{
    coerce_constant, script_name, AttributeRef, BindingSource, BindingSpec, BindingValue, Error as CoreError,
    IndexMap, SourceType, Value,
};

/// Resolve every input of a script
pub fn resolve_bindings(
    resolver: &Resolver,
    specs: &[BindingSpec],
) -> Result<IndexMap<String, BindingValue>> {
    let mut resolved = IndexMap::with_capacity(specs.len());
    let mut in_script: HashMap<String, &str> = HashMap::new();
    for spec in specs {
        let Some(name) = spec.validated_name()? else {
            continue;
        };
        let bound = in_script.entry(script_name(name)).or_insert(name);
        if *bound != name {
            return Err(CoreError::InvalidBinding(format!(
                "Variable names {} and {} both bind {}",
                bound,
                name,
                script_name(name)
            ))
            .into());
        }
        let value = match spec.source()? {
            BindingSource::Constant {
                constant_type,
                value,
            } => BindingValue::constant(coerce_constant(name, constant_type, &value)?),
            BindingSource::Attribute(reference) => resolve_attribute(resolver, &reference)?,
        };
        resolved.insert(name.to_string(), value);
    }
    Ok(resolved)
}

/// Script-facing form of resolved bindings
pub fn binding_values(resolved: &IndexMap<String, BindingValue>) -> IndexMap<String, Value> {
    resolved
        .iter()
        .map(|(name, binding)| (name.clone(), binding.to_value()))
        .collect()
}

fn resolve_attribute(resolver: &Resolver, reference: &AttributeRef) -> Result<BindingValue> {
    let store = resolver.store();
    match reference {
        AttributeRef::Key {
            asset_id,
            template_item_id,
            path,
        } => {
            let label = || {
                path.clone()
                    .unwrap_or_else(|| format!("{}::{}", asset_id.raw(), template_item_id.raw()))
            };
            let attribute = store
                .find_attribute(*asset_id, *template_item_id)?
                .ok_or_else(|| CoreError::AttributeNotFound(label()))?;
            let item = store
                .get_template_item(*template_item_id)?
                .ok_or_else(|| CoreError::AttributeNotFound(label()))?;
            let path = path.clone().or_else(|| {
                resolver
                    .index()
                    .path_of(*asset_id)
                    .map(|asset_path| format!("{}.{}", asset_path, item.name))
            });
            Ok(BindingValue {
                source_type: SourceType::Attribute,
                value: attribute.value,
                data_type: Some(item.data_type),
                unit: item.unit,
                asset_id: Some(*asset_id),
                template_item_id: Some(*template_item_id),
                attribute_id: Some(attribute.id),
                path,
            })
        }
        AttributeRef::Path(path) => {
            let tag = resolver.resolve_tag_path(path)?;
            let attribute = store
                .find_attribute(tag.asset_id, tag.template_item_id)?
                .ok_or_else(|| CoreError::AttributeNotFound(path.clone()))?;
            Ok(BindingValue {
                source_type: SourceType::Attribute,
                value: attribute.value,
                data_type: Some(tag.data_type),
                unit: tag.unit,
                asset_id: Some(tag.asset_id),
                template_item_id: Some(tag.template_item_id),
                attribute_id: Some(attribute.id),
                path: Some(path.clone()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::plant;
    use crate::Error;
    use assay_core::{AssetId, ConstantType, DataType, TemplateItemId};

    fn resolver() -> (crate::testing::Plant, Resolver) {
        let fixture = plant();
        let resolver = Resolver::load(fixture.store.clone()).unwrap();
        (fixture, resolver)
    }

    #[test]
    fn test_constant_coercion() {
        let (_, resolver) = resolver();
        let specs = [
            BindingSpec::constant("k", ConstantType::Number, "7.2".into()),
            BindingSpec::constant("on", ConstantType::Boolean, "TRUE".into()),
            BindingSpec::constant("label", ConstantType::String, Value::Int(3)),
        ];
        let resolved = resolve_bindings(&resolver, &specs).unwrap();
        assert_eq!(resolved["k"].value, Value::Float(7.2));
        assert_eq!(resolved["on"].value, Value::Bool(true));
        assert_eq!(resolved["label"].value, Value::from("3"));
        assert_eq!(resolved["k"].source_type, SourceType::Constant);
    }

    #[test]
    fn test_attribute_by_path_and_key_agree() {
        let (fixture, resolver) = resolver();
        let specs = [
            BindingSpec::path("p", "Plant A.Pump-01.pressure"),
            BindingSpec::key("q", fixture.pump.id, fixture.pressure.id),
        ];
        let resolved = resolve_bindings(&resolver, &specs).unwrap();
        let (p, q) = (&resolved["p"], &resolved["q"]);
        assert_eq!(p.value, Value::Float(6.5));
        assert_eq!(p.value, q.value);
        assert_eq!(p.attribute_id, q.attribute_id);
        assert_eq!(p.data_type, Some(DataType::Number));
        assert_eq!(p.unit.as_deref(), Some("bar"));
        assert_eq!(q.path.as_deref(), Some("Plant A.Pump-01.pressure"));
    }

    #[test]
    fn test_blank_names_skipped_and_order_kept() {
        let (_, resolver) = resolver();
        let specs = [
            BindingSpec::constant("b", ConstantType::Number, Value::Int(1)),
            BindingSpec::constant("  ", ConstantType::Number, "not a number".into()),
            BindingSpec::constant("a", ConstantType::Number, Value::Int(2)),
        ];
        let resolved = resolve_bindings(&resolver, &specs).unwrap();
        let names: Vec<_> = resolved.keys().cloned().collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn test_first_failure_aborts() {
        let (_, resolver) = resolver();
        let specs = [
            BindingSpec::constant("x", ConstantType::Number, "abc".into()),
            BindingSpec::path("bad name", "Plant A.Pump-01.pressure"),
        ];
        let err = resolve_bindings(&resolver, &specs).unwrap_err();
        assert!(
            matches!(&err, Error::Core(CoreError::InvalidBinding(m)) if m == "Invalid number constant for x"),
            "{err:?}"
        );
    }

    #[test]
    fn test_names_colliding_in_script_rejected() {
        let (_, resolver) = resolver();
        let specs = [
            BindingSpec::constant("$x", ConstantType::Number, "1".into()),
            BindingSpec::constant("_x", ConstantType::Number, "2".into()),
        ];
        let err = resolve_bindings(&resolver, &specs).unwrap_err();
        assert!(
            matches!(&err, Error::Core(CoreError::InvalidBinding(m)) if m == "Variable names $x and _x both bind _x"),
            "{err:?}"
        );

        let specs = [
            BindingSpec::constant("$x", ConstantType::Number, "1".into()),
            BindingSpec::constant("x", ConstantType::Number, "2".into()),
            BindingSpec::constant("x$", ConstantType::Number, "3".into()),
        ];
        assert_eq!(resolve_bindings(&resolver, &specs).unwrap().len(), 3);
    }

    #[test]
    fn test_attribute_errors() {
        let (_, resolver) = resolver();

        let mut spec = BindingSpec::path("p", "");
        let err = resolve_bindings(&resolver, &[spec.clone()]).unwrap_err();
        assert!(
            matches!(&err, Error::Core(CoreError::InvalidBinding(m)) if m == "Attribute path required for p")
        );

        spec.attribute_key = Some("12-5".into());
        let err = resolve_bindings(&resolver, &[spec]).unwrap_err();
        assert!(
            matches!(&err, Error::Core(CoreError::InvalidBinding(m)) if m == "Invalid attributeKey format")
        );

        let missing = BindingSpec::key("m", AssetId(999), TemplateItemId(1));
        let err = resolve_bindings(&resolver, &[missing]).unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::AttributeNotFound(_))));

        let unknown = BindingSpec::path("u", "Plant A.Pump-02.pressure");
        let err = resolve_bindings(&resolver, &[unknown]).unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::PathNotFound(_))));
    }

    #[test]
    fn test_script_facing_values() {
        let (_, resolver) = resolver();
        let resolved =
            resolve_bindings(&resolver, &[BindingSpec::path("p", "Plant A.Pump-01.pressure")])
                .unwrap();
        let values = binding_values(&resolved);
        let p = &values["p"];
        assert_eq!(p.get("sourceType"), Some(&Value::from("attribute")));
        assert_eq!(p.get("value"), Some(&Value::Float(6.5)));
        assert_eq!(p.get("dataType"), Some(&Value::from("NUMBER")));
    }
}
