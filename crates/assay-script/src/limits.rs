//! Resource ceilings applied to each engine
//!
//! Rhai checks data sizes one value at a time, so the heap budget is split
//! into equal shares, one per value a script can hold at once:
//!
//! - `let` variables, capped by `max_variables` across all call frames
//! - function parameters, at most `max_function_params` per frame
//! - one temporary per level of expression nesting in every frame
//!
//! Within a share, half goes to string bytes and a quarter each to array
//! and map slots, so
//!
//! ```text
//! live bytes <= value_slots() * value_budget() <= memory_limit_bytes
//! ```

use rhai::{Engine, AST};

/// Per-runtime resource limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Heap budget in bytes for everything a script holds at once
    pub memory_limit_bytes: usize,
    /// Maximum `let` variables alive at once across all call frames
    pub max_variables: usize,
    /// Maximum parameters of one script function
    pub max_function_params: usize,
    /// Maximum function call nesting
    pub max_call_levels: usize,
    /// Maximum expression nesting at global level
    pub max_expr_depth: usize,
    /// Maximum expression nesting inside functions
    pub max_function_expr_depth: usize,
}

/// Size of one array or map slot (`Dynamic`)
const SLOT_BYTES: usize = 16;

impl Default for SandboxLimits {
    fn default() -> Self {
        Self::with_memory_mb(64)
    }
}

impl SandboxLimits {
    /// Limits for a given memory budget in megabytes
    pub fn with_memory_mb(mb: usize) -> Self {
        Self {
            memory_limit_bytes: mb.max(1) * 1024 * 1024,
            max_variables: 32,
            max_function_params: 6,
            max_call_levels: 16,
            max_expr_depth: 32,
            max_function_expr_depth: 8,
        }
    }

    /// Values a script can hold at once
    pub fn value_slots(&self) -> usize {
        let frames = self.max_call_levels;
        (self.max_variables
            + frames * self.max_function_params
            + self.max_expr_depth
            + frames * self.max_function_expr_depth)
            .max(1)
    }

    /// Bytes one value may occupy
    pub fn value_budget(&self) -> usize {
        self.memory_limit_bytes / self.value_slots()
    }

    /// Maximum bytes of string data in one value
    pub fn max_string_len(&self) -> usize {
        (self.value_budget() / 2).max(1)
    }

    /// Maximum entries across the arrays (or the maps) of one value
    pub fn max_collection_len(&self) -> usize {
        (self.value_budget() / 4 / SLOT_BYTES).max(1)
    }

    /// Install the limits on an engine
    pub fn apply(&self, engine: &mut Engine) {
        engine.set_max_string_size(self.max_string_len());
        engine.set_max_array_size(self.max_collection_len());
        engine.set_max_map_size(self.max_collection_len());
        engine.set_max_variables(self.max_variables);
        engine.set_max_call_levels(self.max_call_levels);
        engine.set_max_expr_depths(self.max_expr_depth, self.max_function_expr_depth);
    }

    /// Reject script functions with more parameters than the budget allows
    pub fn check_functions(&self, ast: &AST) -> Result<(), String> {
        match ast
            .iter_functions()
            .find(|f| f.params.len() > self.max_function_params)
        {
            Some(f) => Err(format!(
                "function '{}' takes {} parameters, at most {} allowed",
                f.name,
                f.params.len(),
                self.max_function_params
            )),
            None => Ok(()),
        }
    }
}
