//! Hub - the analysis orchestrator
//!
//! `run_analysis` drives one run end to end:
//!
//! 1. Load the script (or its linked template) by name
//! 2. Build the asset index, resolve bindings, build the macro snapshot
//! 3. Execute on the worker pool
//! 4. Apply declared writes; query rows replace the result
//!
//! Storage work runs on the blocking pool. Any failure before step 3 aborts
//! the run without executing the script.

use crate::bindings::{binding_values, resolve_bindings};
use crate::commit;
use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::historian::{bucket_last, Aggregate};
use crate::pool::{Task, WorkerPool};
use crate::resolve::Resolver;
use crate::snapshot::build_macro_snapshot;
use assay_core::{
    parse_range, Asset, AssetId, AttributeId, Bucket, DataType, Error as CoreError, IndexMap,
    ScriptOutput, TemplateItemId, TimeFormat, Timestamp, Value, ValueMap,
};
use assay_db::Store;
use assay_script::MacroSnapshot;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// An attribute as shown in asset lookups
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeView {
    pub attribute_id: AttributeId,
    pub template_item_id: TemplateItemId,
    pub name: String,
    pub data_type: DataType,
    pub unit: Option<String>,
    pub value: Value,
}

/// An asset with its path and attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetView {
    #[serde(flatten)]
    pub asset: Asset,
    pub path: String,
    pub attributes: Vec<AttributeView>,
}

/// Result of resolving an asset path
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetLookup {
    pub asset: AssetView,
    /// Root first, ending with the asset itself
    pub hierarchy: Vec<Asset>,
}

/// Current value of a tag path
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeReading {
    pub path: String,
    pub asset_id: AssetId,
    pub template_item_id: TemplateItemId,
    pub attribute_id: AttributeId,
    pub data_type: DataType,
    pub unit: Option<String>,
    pub value: Value,
}

/// Aggregate of a tag's historian points over a range
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReading {
    pub path: String,
    pub asset_id: AssetId,
    pub attribute_id: AttributeId,
    pub agg: Aggregate,
    pub start: String,
    pub end: String,
    pub points: usize,
    pub value: Value,
}

/// Historian points of a tag over a range
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorianReading {
    pub path: String,
    pub asset_id: AssetId,
    pub template_item_id: TemplateItemId,
    pub attribute_id: AttributeId,
    /// `{ts, value}` rows ascending by time, ts as ISO-8601 text
    pub data: Vec<Value>,
}

/// What an analysis run produced
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    /// The script's own result
    Result(Value),
    /// Historian query rows, which replace the script's result
    Rows(Vec<Value>),
}

impl RunOutput {
    pub fn into_value(self) -> Value {
        match self {
            RunOutput::Result(value) => value,
            RunOutput::Rows(rows) => Value::List(rows),
        }
    }
}

/// Everything a run needs before it reaches the pool
struct PreparedRun {
    resolver: Resolver,
    script: Arc<str>,
    bindings: IndexMap<String, Value>,
    snapshot: Arc<MacroSnapshot>,
}

fn prepare(store: Arc<Store>, name: &str) -> Result<PreparedRun> {
    let script = store
        .find_script_by_name(name)?
        .ok_or_else(|| Error::ScriptNotFound(name.to_string()))?;
    let template = match script.template_id {
        Some(id) => store.get_script_template(id)?,
        None => None,
    };
    let (body, inputs) = script.effective(template.as_ref());

    let resolver = Resolver::load(store)?;
    let resolved = resolve_bindings(&resolver, inputs)?;
    let snapshot = build_macro_snapshot(resolver.store(), resolver.index())?;

    debug!(
        analysis = name,
        bindings = resolved.len(),
        templated = template.is_some(),
        "prepared analysis run"
    );
    Ok(PreparedRun {
        script: Arc::from(body),
        bindings: binding_values(&resolved),
        snapshot: Arc::new(snapshot),
        resolver,
    })
}

fn attribute_views(store: &Store, asset: &Asset) -> Result<Vec<AttributeView>> {
    let Some(template_id) = asset.template_id else {
        return Ok(Vec::new());
    };
    let attributes = store.attributes_of_asset(asset.id)?;
    let mut views = Vec::new();
    for item in store.template_items(template_id)? {
        let Some(attribute) = attributes.iter().find(|a| a.template_item_id == item.id) else {
            continue;
        };
        views.push(AttributeView {
            attribute_id: attribute.id,
            template_item_id: item.id,
            name: item.name,
            data_type: item.data_type,
            unit: item.unit,
            value: attribute.value.clone(),
        });
    }
    Ok(views)
}

/// Runs analyses against one store
pub struct Hub {
    store: Arc<Store>,
    pool: WorkerPool,
    config: HubConfig,
}

impl Hub {
    /// Create a hub and start its worker pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<Store>, config: HubConfig) -> Result<Self> {
        let pool = WorkerPool::new(&config)?;
        Ok(Self::with_pool(store, config, pool))
    }

    /// Create a hub around an existing pool
    pub fn with_pool(store: Arc<Store>, config: HubConfig, pool: WorkerPool) -> Self {
        Self {
            store,
            pool,
            config,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Run the named analysis
    pub async fn run_analysis(&self, name: &str) -> Result<RunOutput> {
        let started = Instant::now();
        let store = Arc::clone(&self.store);
        let owned = name.to_string();
        let prepared = tokio::task::spawn_blocking(move || prepare(store, &owned)).await??;

        let task = Task::new(prepared.script)
            .with_bindings(prepared.bindings)
            .with_snapshot(prepared.snapshot);
        let returned = match self.pool.submit(task).await {
            Ok(value) => value,
            Err(err) => {
                warn!(analysis = name, error = %err, "analysis script failed");
                return Err(err);
            }
        };

        let output = ScriptOutput::from_return(returned)?;
        let mut result = RunOutput::Result(output.result);
        if !output.writes.is_empty() {
            let written = commit::apply(&prepared.resolver, output.writes).await?;
            if let Some(rows) = written.rows {
                result = RunOutput::Rows(rows);
            }
        }

        info!(
            analysis = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis run finished"
        );
        Ok(result)
    }

    /// Resolve a dotted asset path
    pub async fn lookup_asset_path(&self, path: &str) -> Result<AssetLookup> {
        let store = Arc::clone(&self.store);
        let path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<AssetLookup> {
            let resolver = Resolver::load(store)?;
            let (asset, hierarchy) = resolver.resolve_asset_path(&path)?;
            let attributes = attribute_views(resolver.store(), asset)?;
            let path = hierarchy
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(".");
            Ok(AssetLookup {
                asset: AssetView {
                    asset: asset.clone(),
                    path,
                    attributes,
                },
                hierarchy: hierarchy.into_iter().cloned().collect(),
            })
        })
        .await?
    }

    /// Current value of a tag path
    pub async fn attribute_value(&self, path: &str) -> Result<AttributeReading> {
        let store = Arc::clone(&self.store);
        let path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<AttributeReading> {
            let resolver = Resolver::load(store)?;
            let tag = resolver.resolve_tag_path(&path)?;
            let attribute = resolver
                .store()
                .find_attribute(tag.asset_id, tag.template_item_id)?
                .ok_or_else(|| CoreError::AttributeNotFound(path.clone()))?;
            Ok(AttributeReading {
                path,
                asset_id: tag.asset_id,
                template_item_id: tag.template_item_id,
                attribute_id: attribute.id,
                data_type: tag.data_type,
                unit: tag.unit,
                value: attribute.value,
            })
        })
        .await?
    }

    /// Aggregate a tag's historian points over `[start, end]`
    pub async fn aggregate(
        &self,
        path: &str,
        start: &Value,
        end: &Value,
        agg: Aggregate,
    ) -> Result<AggregateReading> {
        let (start, end) = parse_range(start, end)?;
        let store = Arc::clone(&self.store);
        let path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<AggregateReading> {
            let resolver = Resolver::load(store)?;
            let tag = resolver.resolve_tag_path(&path)?;
            let attribute_id = tag
                .attribute_id
                .ok_or_else(|| CoreError::AttributeNotFound(path.clone()))?;
            let points = resolver.store().historian_range(attribute_id, start, end)?;
            Ok(AggregateReading {
                asset_id: tag.asset_id,
                attribute_id,
                agg,
                start: start.to_iso(),
                end: end.to_iso(),
                points: points.len(),
                value: agg.apply(&points),
                path,
            })
        })
        .await?
    }

    /// A tag's historian points in `[start, end]`
    ///
    /// With a bucket, only the last point of each bucket is kept, stamped
    /// with the bucket start.
    pub async fn historian_range(
        &self,
        path: &str,
        start: &Value,
        end: &Value,
        bucket: Option<&str>,
    ) -> Result<HistorianReading> {
        let (start, end) = parse_range(start, end)?;
        let bucket = bucket.map(Bucket::parse).transpose()?;
        let store = Arc::clone(&self.store);
        let path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<HistorianReading> {
            let resolver = Resolver::load(store)?;
            let tag = resolver.resolve_tag_path(&path)?;
            let attribute_id = tag
                .attribute_id
                .ok_or_else(|| CoreError::AttributeNotFound(path.clone()))?;
            let points = resolver.store().historian_range(attribute_id, start, end)?;
            let series = match bucket {
                Some(bucket) => bucket_last(&points, bucket),
                None => points
                    .into_iter()
                    .map(|p| (Timestamp(p.ts), p.value))
                    .collect(),
            };
            let data = series
                .into_iter()
                .map(|(ts, value)| {
                    let mut row = ValueMap::new();
                    row.insert("ts".into(), TimeFormat::Iso.render(ts));
                    row.insert("value".into(), value);
                    Value::Map(row)
                })
                .collect();
            Ok(HistorianReading {
                asset_id: tag.asset_id,
                template_item_id: tag.template_item_id,
                attribute_id,
                data,
                path,
            })
        })
        .await?
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{plant, Plant};
    use assay_core::{BindingSpec, ConstantType, Timestamp};
    use assay_db::NewScript;

    fn hub(fixture: &Plant) -> Hub {
        let config = HubConfig::with_pool_size(2).with_timeout_ms(500);
        Hub::new(fixture.store.clone(), config).unwrap()
    }

    fn save(fixture: &Plant, name: &str, script: &str, inputs: Vec<BindingSpec>) {
        fixture
            .store
            .save_script(NewScript {
                name: name.to_string(),
                script: script.to_string(),
                inputs,
                template_id: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_constant_and_attribute_inputs() {
        let fixture = plant();
        save(
            &fixture,
            "scaled",
            "#{ result: k.value * p.value }",
            vec![
                BindingSpec::constant("k", ConstantType::Number, "2".into()),
                BindingSpec::path("p", "Plant A.Pump-01.pressure"),
            ],
        );
        let hub = hub(&fixture);
        let result = hub.run_analysis("scaled").await.unwrap();
        assert_eq!(result, RunOutput::Result(Value::Float(13.0)));
    }

    #[tokio::test]
    async fn test_write_back_updates_live_value() {
        let fixture = plant();
        save(
            &fixture,
            "bump",
            r#"#{ result: "ok", writes: [ #{ path: "Plant A.Pump-01.speed", value: speed.value + 50 } ] }"#,
            vec![BindingSpec::path("speed", "Plant A.Pump-01.speed")],
        );
        let hub = hub(&fixture);
        assert_eq!(
            hub.run_analysis("bump").await.unwrap(),
            RunOutput::Result(Value::from("ok"))
        );

        let reading = hub.attribute_value("Plant A.Pump-01.speed").await.unwrap();
        assert_eq!(reading.value, Value::Int(1500));
    }

    #[tokio::test]
    async fn test_historian_query_replaces_result() {
        let fixture = plant();
        save(
            &fixture,
            "history",
            r#"
            let writes = [];
            for i in 0..12 {
                writes.push(#{ target: "historian", path: "Plant A.Pump-01.pressure", value: 6.0 + i, ts: i * 900000 });
            }
            writes.push(#{ target: "historianQuery", paths: ["Plant A.Pump-01.pressure"], start: 0, end: 36000000, bucket: "1 hour" });
            #{ result: "ignored", writes: writes }
            "#,
            vec![],
        );
        let hub = hub(&fixture);
        let RunOutput::Rows(rows) = hub.run_analysis("history").await.unwrap() else {
            panic!("expected query rows");
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("ts"), Some(&Value::Int(0)));
        assert_eq!(rows[0].get("pressure"), Some(&Value::Float(9.0)));
        assert_eq!(rows[2].get("ts"), Some(&Value::Int(7_200_000)));
        assert_eq!(rows[2].get("pressure"), Some(&Value::Float(17.0)));
    }

    #[tokio::test]
    async fn test_hourly_points_keep_one_row_per_hour() {
        let fixture = plant();
        save(
            &fixture,
            "hourly",
            r#"
            let writes = [];
            for i in 0..12 {
                writes.push(#{ target: "historian", path: "Plant A.Pump-01.pressure", value: 1.0 + i, ts: i * 3600000 });
            }
            writes.push(#{ target: "historianQuery", paths: ["Plant A.Pump-01.pressure"], start: 0, end: 39600000, bucket: "1 hour" });
            #{ result: "ignored", writes: writes }
            "#,
            vec![],
        );
        let hub = hub(&fixture);
        let RunOutput::Rows(rows) = hub.run_analysis("hourly").await.unwrap() else {
            panic!("expected query rows");
        };
        assert_eq!(rows.len(), 12);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.get("ts"), Some(&Value::Int(i as i64 * 3_600_000)));
            assert_eq!(row.get("pressure"), Some(&Value::Float(1.0 + i as f64)));
        }
    }

    #[tokio::test]
    async fn test_numeric_text_written_as_number() {
        let fixture = plant();
        save(
            &fixture,
            "set-pressure",
            r#"#{ result: "ok", writes: [ #{ path: "Plant A.Pump-01.pressure", value: "7.2" } ] }"#,
            vec![],
        );
        let hub = hub(&fixture);
        hub.run_analysis("set-pressure").await.unwrap();

        let reading = hub.attribute_value("Plant A.Pump-01.pressure").await.unwrap();
        assert_eq!(reading.value, Value::Float(7.2));
    }

    #[tokio::test]
    async fn test_unknown_script_and_bad_binding() {
        let fixture = plant();
        save(
            &fixture,
            "broken",
            "1",
            vec![BindingSpec::path("p", "Plant A.Pump-07.pressure")],
        );
        let hub = hub(&fixture);

        let err = hub.run_analysis("missing").await.unwrap_err();
        assert!(matches!(err, Error::ScriptNotFound(_)));

        let err = hub.run_analysis("broken").await.unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::PathNotFound(_))));
        assert_eq!(hub.pool().stats().await.unwrap().dispatched, 0);
    }

    #[tokio::test]
    async fn test_template_supplies_body_and_inputs() {
        let fixture = plant();
        let template = fixture
            .store
            .save_script_template(
                "double",
                "x.value * 2",
                vec![BindingSpec::constant("x", ConstantType::Number, Value::Int(21))],
            )
            .unwrap();
        fixture
            .store
            .save_script(NewScript {
                name: "templated".into(),
                script: "0".into(),
                inputs: vec![],
                template_id: Some(template.id),
            })
            .unwrap();
        let hub = hub(&fixture);
        assert_eq!(
            hub.run_analysis("templated").await.unwrap().into_value(),
            Value::Int(42)
        );
    }

    #[tokio::test]
    async fn test_script_timeout_surfaces() {
        let fixture = plant();
        save(&fixture, "spin", "loop { }", vec![]);
        let hub = hub(&fixture);
        let err = hub.run_analysis("spin").await.unwrap_err();
        assert!(matches!(err, Error::Sandbox(assay_script::Error::Timeout(500))));
    }

    #[tokio::test]
    async fn test_lookup_asset_path() {
        let fixture = plant();
        let hub = hub(&fixture);
        let lookup = hub.lookup_asset_path("Plant A.Pump-01").await.unwrap();
        assert_eq!(lookup.asset.asset.id, fixture.pump.id);
        assert_eq!(lookup.asset.path, "Plant A.Pump-01");
        assert_eq!(lookup.hierarchy.len(), 2);
        let names: Vec<_> = lookup.asset.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["pressure", "temperature", "speed", "metadata"]);

        let err = hub.lookup_asset_path("Plant B").await.unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::PathNotFound(_))));
    }

    #[tokio::test]
    async fn test_aggregate() {
        let fixture = plant();
        for (ts, value) in [(1000, 1.0), (2000, 3.0), (3000, 8.0)] {
            fixture
                .store
                .write_historian(fixture.pump.id, fixture.pressure.id, Timestamp(ts), &Value::Float(value))
                .unwrap();
        }
        let hub = hub(&fixture);
        let reading = hub
            .aggregate(
                "Plant A.Pump-01.pressure",
                &Value::Int(1000),
                &Value::Int(2000),
                Aggregate::Avg,
            )
            .await
            .unwrap();
        assert_eq!(reading.value, Value::Float(2.0));
        assert_eq!(reading.points, 2);

        let err = hub
            .aggregate("Plant A.Pump-01.pressure", &Value::Int(5), &Value::Int(1), Aggregate::Max)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::InvalidTimeRange(_))));
    }

    #[tokio::test]
    async fn test_historian_range() {
        let fixture = plant();
        for (ts, value) in [(500, 0.5), (1000, 1.0), (1500, 1.5), (2500, 2.5), (4000, 4.0)] {
            fixture
                .store
                .write_historian(fixture.pump.id, fixture.pressure.id, Timestamp(ts), &Value::Float(value))
                .unwrap();
        }
        let hub = hub(&fixture);
        let path = "Plant A.Pump-01.pressure";

        let reading = hub
            .historian_range(path, &Value::Int(1000), &Value::Int(2500), None)
            .await
            .unwrap();
        assert_eq!(reading.asset_id, fixture.pump.id);
        assert_eq!(reading.template_item_id, fixture.pressure.id);
        let values: Vec<_> = reading.data.iter().filter_map(|row| row.get("value")).collect();
        assert_eq!(values, [&Value::Float(1.0), &Value::Float(1.5), &Value::Float(2.5)]);

        let reading = hub
            .historian_range(path, &Value::Int(0), &Value::Int(4000), Some("2s"))
            .await
            .unwrap();
        let values: Vec<_> = reading.data.iter().filter_map(|row| row.get("value")).collect();
        assert_eq!(values, [&Value::Float(1.5), &Value::Float(2.5), &Value::Float(4.0)]);

        let err = hub
            .historian_range(path, &Value::Int(9), &Value::Int(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::InvalidTimeRange(_))));
        let err = hub
            .historian_range("Plant A.Pump-01.flow", &Value::Int(0), &Value::Int(1), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Core(CoreError::PathNotFound(_) | CoreError::AttributeNotFound(_))
        ));
    }
}
