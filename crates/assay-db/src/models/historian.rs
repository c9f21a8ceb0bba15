//! Historian models for database storage.

use crate::error::Result;
use assay_core::{AttributeId, HistorianPoint, Timestamp, Value};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// Stored time-series sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 5, version = 1)]
#[native_db]
pub struct StoredHistorianPoint {
    /// `"{attribute:020}:{ts:020}"`; a second write at the same ts replaces the row.
    #[primary_key]
    pub key: String,
    /// Owning attribute.
    #[secondary_key]
    pub attribute_id: u64,
    /// Epoch milliseconds.
    pub ts: i64,
    /// Serialized value.
    pub value: Vec<u8>,
}

impl StoredHistorianPoint {
    /// Primary key for an attribute and timestamp.
    ///
    /// The timestamp is shifted into unsigned space so keys sort by time.
    pub fn point_key(attribute_id: AttributeId, ts: Timestamp) -> String {
        let biased = (ts.millis() as u64) ^ (1 << 63);
        format!("{:020}:{:020}", attribute_id.raw(), biased)
    }

    /// Create a row.
    pub fn new(attribute_id: AttributeId, ts: Timestamp, value: &Value) -> Result<Self> {
        Ok(Self {
            key: Self::point_key(attribute_id, ts),
            attribute_id: attribute_id.raw(),
            ts: ts.millis(),
            value: bincode::serialize(value)?,
        })
    }

    /// Convert to a HistorianPoint.
    pub fn to_point(&self) -> Result<HistorianPoint> {
        Ok(HistorianPoint {
            attribute_id: AttributeId(self.attribute_id),
            ts: self.ts,
            value: bincode::deserialize(&self.value)?,
        })
    }
}
