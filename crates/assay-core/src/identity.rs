//! Identity types for stored records

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new ID
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw ID value
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

record_id!(
    /// Unique identifier for an asset
    AssetId,
    "asset"
);
record_id!(
    /// Unique identifier for an attribute template
    TemplateId,
    "template"
);
record_id!(
    /// Unique identifier for an item within an attribute template
    TemplateItemId,
    "item"
);
record_id!(
    /// Unique identifier for an attribute (one asset, one template item)
    AttributeId,
    "attribute"
);
record_id!(
    /// Unique identifier for an analysis script
    ScriptId,
    "script"
);
record_id!(
    /// Unique identifier for an analysis script template
    ScriptTemplateId,
    "script-template"
);
