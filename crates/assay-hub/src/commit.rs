//! Write-Back Dispatcher - apply a script's declared writes
//!
//! Mutations are grouped by target path. Groups run concurrently on the
//! blocking pool; writes inside a group keep their declared order, so two
//! writes to the same path never race. Once every group has finished the
//! first failure in group order is reported. Writes that already succeeded
//! stay applied.
//!
//! Historian queries run after all mutations, so they observe them. Their
//! rows, concatenated in declaration order, replace the script's result.

use crate::error::{Error, Result};
use crate::historian::run_query;
use crate::resolve::Resolver;
use assay_core::{
    coerce_attribute_value, HistorianQuery, IndexMap, Timestamp, Value, Write, WriteSet,
};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// What applying a write set produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBack {
    /// Mutations applied
    pub applied: usize,
    /// Query rows, when the write set held at least one query
    pub rows: Option<Vec<Value>>,
}

/// Split a write set into per-path mutation groups and queries
///
/// Groups are ordered by the first appearance of their path.
pub fn partition(writes: WriteSet) -> (Vec<Vec<Write>>, Vec<HistorianQuery>) {
    let mut groups: IndexMap<String, Vec<Write>> = IndexMap::new();
    let mut queries = Vec::new();
    for write in writes.into_writes() {
        match write {
            Write::HistorianQuery(query) => queries.push(query),
            mutation => {
                let key = mutation.mutation_path().unwrap_or_default().to_string();
                groups.entry(key).or_default().push(mutation);
            }
        }
    }
    (groups.into_values().collect(), queries)
}

/// Apply one mutation
pub fn apply_write(resolver: &Resolver, write: &Write) -> Result<()> {
    match write {
        Write::Attribute { path, value } => {
            let tag = resolver.resolve_tag_path(path)?;
            let value = coerce_attribute_value(tag.data_type, value)?;
            resolver
                .store()
                .set_attribute_value(tag.asset_id, tag.template_item_id, &value)?;
        }
        Write::Historian { path, value, ts } => {
            let tag = resolver.resolve_tag_path(path)?;
            let value = coerce_attribute_value(tag.data_type, value)?;
            let ts = ts.unwrap_or_else(Timestamp::now);
            resolver
                .store()
                .write_historian(tag.asset_id, tag.template_item_id, ts, &value)?;
        }
        Write::HistorianQuery(_) => {}
    }
    Ok(())
}

fn apply_group(resolver: &Resolver, group: &[Write]) -> Result<usize> {
    for (i, write) in group.iter().enumerate() {
        if let Err(err) = apply_write(resolver, write) {
            warn!(
                path = write.mutation_path().unwrap_or_default(),
                applied = i,
                error = %err,
                "write-back group stopped"
            );
            return Err(err);
        }
    }
    Ok(group.len())
}

/// Apply a write set
pub async fn apply(resolver: &Resolver, writes: WriteSet) -> Result<WriteBack> {
    let (groups, queries) = partition(writes);

    let mut tasks = JoinSet::new();
    for (index, group) in groups.into_iter().enumerate() {
        let resolver = resolver.clone();
        tasks.spawn_blocking(move || (index, apply_group(&resolver, &group)));
    }

    let mut outcomes: Vec<(usize, Result<usize>)> = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        outcomes.push(joined?);
    }
    outcomes.sort_by_key(|(index, _)| *index);

    let mut applied = 0;
    let mut first_error = None;
    for (_, outcome) in outcomes {
        match outcome {
            Ok(n) => applied += n,
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }
    debug!(applied, queries = queries.len(), "write-back mutations applied");

    if queries.is_empty() {
        return Ok(WriteBack {
            applied,
            rows: None,
        });
    }

    let resolver = resolver.clone();
    let rows = tokio::task::spawn_blocking(move || -> Result<Vec<Value>> {
        let mut rows = Vec::new();
        for query in &queries {
            rows.extend(run_query(&resolver, query)?);
        }
        Ok(rows)
    })
    .await
    .map_err(Error::from)??;

    Ok(WriteBack {
        applied,
        rows: Some(rows),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::plant;
    use assay_core::Error as CoreError;

    fn write_set(json: &str) -> WriteSet {
        WriteSet::from_value(&Value::parse_json(json).unwrap()).unwrap()
    }

    fn live(resolver: &Resolver, path: &str) -> Value {
        let tag = resolver.resolve_tag_path(path).unwrap();
        resolver
            .store()
            .find_attribute(tag.asset_id, tag.template_item_id)
            .unwrap()
            .unwrap()
            .value
    }

    #[test]
    fn test_partition_groups_by_path() {
        let writes = write_set(
            r#"[
                {"path":"A.b.x","value":1},
                {"path":"A.b.y","value":2},
                {"target":"historianQuery","paths":"A.b.x","start":0,"end":10},
                {"path":"A.b.x","value":3}
            ]"#,
        );
        let (groups, queries) = partition(writes);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(
            groups[0][1],
            Write::Attribute {
                path: "A.b.x".into(),
                value: Value::Int(3)
            }
        );
        assert_eq!(queries.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_coerce_and_keep_order() {
        let fixture = plant();
        let resolver = Resolver::load(fixture.store.clone()).unwrap();
        let writes = write_set(
            r#"[
                {"path":"Plant A.Pump-01.pressure","value":"7.0"},
                {"path":"Plant A.Pump-01.pressure","value":"7.5"},
                {"path":"Plant A.Pump-01.metadata","value":"{\"vendor\":\"acme\"}"}
            ]"#,
        );
        let outcome = apply(&resolver, writes).await.unwrap();
        assert_eq!(outcome.applied, 3);
        assert_eq!(outcome.rows, None);
        assert_eq!(live(&resolver, "Plant A.Pump-01.pressure"), Value::Float(7.5));
        assert_eq!(
            live(&resolver, "Plant A.Pump-01.metadata").get("vendor"),
            Some(&Value::from("acme"))
        );
    }

    #[tokio::test]
    async fn test_partial_failure_is_not_rolled_back() {
        let fixture = plant();
        let resolver = Resolver::load(fixture.store.clone()).unwrap();
        let writes = write_set(
            r#"[
                {"path":"Plant A.Pump-01.pressure","value":9.1},
                {"path":"Plant A.Pump-01.speed","value":"fast"},
                {"path":"Plant A.Pump-01.temperature","value":81}
            ]"#,
        );
        let err = apply(&resolver, writes).await.unwrap_err();
        assert!(
            matches!(&err, Error::Core(CoreError::ParseError(m)) if m == "Value must be a number"),
            "{err:?}"
        );
        assert_eq!(live(&resolver, "Plant A.Pump-01.pressure"), Value::Float(9.1));
        assert_eq!(live(&resolver, "Plant A.Pump-01.temperature"), Value::Int(81));
        assert_eq!(live(&resolver, "Plant A.Pump-01.speed"), Value::Int(1450));
    }

    #[tokio::test]
    async fn test_first_error_by_group_order() {
        let fixture = plant();
        let resolver = Resolver::load(fixture.store.clone()).unwrap();
        let writes = write_set(
            r#"[
                {"path":"Plant A.Pump-09.pressure","value":1},
                {"path":"Plant A.Pump-01.speed","value":"fast"}
            ]"#,
        );
        let err = apply(&resolver, writes).await.unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::PathNotFound(_))), "{err:?}");
    }

    #[tokio::test]
    async fn test_historian_write_then_query() {
        let fixture = plant();
        let resolver = Resolver::load(fixture.store.clone()).unwrap();
        let writes = write_set(
            r#"[
                {"target":"historian","path":"Plant A.Pump-01.pressure","value":6.1,"ts":1000},
                {"target":"historian","path":"Plant A.Pump-01.pressure","value":6.2,"ts":2000},
                {"target":"historian","path":"Plant A.Pump-01.speed","value":1400,"ts":2000},
                {"target":"historianQuery","paths":["Plant A.Pump-01.pressure","Plant A.Pump-01.speed"],"start":0,"end":5000}
            ]"#,
        );
        let outcome = apply(&resolver, writes).await.unwrap();
        assert_eq!(outcome.applied, 3);
        let rows = outcome.rows.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("ts"), Some(&Value::Int(1000)));
        assert_eq!(rows[0].get("pressure"), Some(&Value::Float(6.1)));
        assert!(rows[0].get("speed").is_none());
        assert_eq!(rows[1].get("speed"), Some(&Value::Int(1400)));

        assert_eq!(live(&resolver, "Plant A.Pump-01.pressure"), Value::Float(6.2));
    }

    #[tokio::test]
    async fn test_same_timestamp_upserts() {
        let fixture = plant();
        let resolver = Resolver::load(fixture.store.clone()).unwrap();
        let writes = write_set(
            r#"[
                {"target":"historian","path":"Plant A.Pump-01.pressure","value":1.0,"ts":5000},
                {"target":"historian","path":"Plant A.Pump-01.pressure","value":2.0,"ts":5000},
                {"target":"historianQuery","paths":"Plant A.Pump-01.pressure","start":0,"end":10000}
            ]"#,
        );
        let rows = apply(&resolver, writes).await.unwrap().rows.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("pressure"), Some(&Value::Float(2.0)));
    }
}
