//! Compiled-script cache
//!
//! Each runtime keeps the last compiled script. Consecutive runs of the same
//! source skip parsing.

use rhai::{Engine, ParseError, AST};
use std::rc::Rc;
use tracing::debug;

/// 64-bit FNV-1a hash of a script source
pub fn source_hash(source: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut h = FNV_OFFSET;
    for &b in source.as_bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// A capacity-1 cache of compiled scripts keyed by source hash
#[derive(Debug, Default)]
pub struct ScriptCache {
    entry: Option<(u64, Rc<AST>)>,
    hits: u64,
    misses: u64,
}

impl ScriptCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compiled form of `source`, compiling only on a miss
    pub fn get_or_compile(&mut self, engine: &Engine, source: &str) -> Result<Rc<AST>, ParseError> {
        let hash = source_hash(source);
        if let Some((cached, ast)) = &self.entry {
            if *cached == hash {
                self.hits += 1;
                return Ok(Rc::clone(ast));
            }
        }

        debug!(hash = format_args!("{hash:016x}"), "compiling script");
        let ast = Rc::new(engine.compile(source)?);
        self.misses += 1;
        self.entry = Some((hash, Rc::clone(&ast)));
        Ok(ast)
    }

    /// Hash of the cached source, if any
    pub fn cached_hash(&self) -> Option<u64> {
        self.entry.as_ref().map(|(hash, _)| *hash)
    }

    /// Number of runs served from the cache
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of compilations
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Drop the cached script
    pub fn clear(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_hash_is_stable() {
        assert_eq!(source_hash(""), 0xcbf29ce484222325);
        assert_eq!(source_hash("a"), 0xaf63dc4c8601ec8c);
        assert_ne!(source_hash("x + 1"), source_hash("x + 2"));
    }

    #[test]
    fn test_recompiles_only_on_change() {
        let engine = Engine::new();
        let mut cache = ScriptCache::new();

        cache.get_or_compile(&engine, "40 + 2").unwrap();
        cache.get_or_compile(&engine, "40 + 2").unwrap();
        assert_eq!((cache.hits(), cache.misses()), (1, 1));

        cache.get_or_compile(&engine, "1 + 1").unwrap();
        assert_eq!(cache.misses(), 2);
        assert_eq!(cache.cached_hash(), Some(source_hash("1 + 1")));

        // capacity one: the first script was evicted
        cache.get_or_compile(&engine, "40 + 2").unwrap();
        assert_eq!(cache.misses(), 3);
    }

    #[test]
    fn test_compile_error_leaves_cache_untouched() {
        let engine = Engine::new();
        let mut cache = ScriptCache::new();
        cache.get_or_compile(&engine, "1").unwrap();
        assert!(cache.get_or_compile(&engine, "let = ;").is_err());
        assert_eq!(cache.cached_hash(), Some(source_hash("1")));
    }
}
