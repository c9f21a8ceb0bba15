//! Database models for persistent storage.

mod asset;
mod attribute;
mod historian;
mod script;

pub use asset::*;
pub use attribute::*;
pub use historian::*;
pub use script::*;
