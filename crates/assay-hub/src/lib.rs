//! # assay-hub
//!
//! Orchestration for sandboxed analysis runs.
//!
//! ## Architecture
//!
//! ```text
//!                    Hub::run_analysis(name)
//!                             │
//!        ┌────────────────────┼─────────────────────┐
//!        ▼                    ▼                     ▼
//!   Resolver            resolve_bindings     build_macro_snapshot
//!   (asset index)       (fail fast)          (path-keyed records)
//!        │                    │                     │
//!        └────────────────────┼─────────────────────┘
//!                             ▼
//!                        WorkerPool ──▶ SandboxRuntime × N
//!                             │
//!                             ▼
//!                      commit::apply (write-back, queries)
//! ```
//!
//! Storage access happens on tokio's blocking pool; scripts run on the
//! pool's dedicated worker threads.

pub mod bindings;
pub mod commit;
mod config;
mod error;
pub mod historian;
mod hub;
pub mod pool;
pub mod resolve;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use bindings::{binding_values, resolve_bindings};
pub use commit::WriteBack;
pub use config::{max_cores, HubConfig};
pub use error::{Error, Result};
pub use historian::Aggregate;
pub use hub::{
    AggregateReading, AssetLookup, AssetView, AttributeReading, AttributeView, HistorianReading,
    Hub, RunOutput,
};
pub use pool::{PoolStats, RuntimeFactory, Task, WorkerPool};
pub use resolve::{AssetIndex, Resolver, TagResolution};
pub use snapshot::build_macro_snapshot;
