//! Assay Script - Sandboxed execution of analysis scripts
//!
//! Each [`SandboxRuntime`] owns one Rhai engine and runs one script at a time:
//!
//! ```text
//! Idle ──run()──▶ Executing ──▶ Idle
//!                     │
//!                     └──panic──▶ Faulted
//! ```
//!
//! A run gets a fresh scope holding deep copies of its bindings, reads the
//! shared [`MacroSnapshot`] through `Asset::get` / `Attribute::get`, and is
//! bounded by a wall-clock deadline and data-size ceilings. Nothing from one
//! run is visible to the next.
//!
//! The engine has no filesystem, network or module access; `eval` is
//! disabled and `print`/`debug` go to `tracing`.

mod cache;
mod convert;
mod error;
mod limits;
mod macros;
mod sandbox;

pub use cache::{source_hash, ScriptCache};
pub use convert::{from_dynamic, to_dynamic};
pub use error::{Error, Result};
pub use limits::SandboxLimits;
pub use macros::MacroSnapshot;
pub use sandbox::{RuntimeState, SandboxRuntime};
