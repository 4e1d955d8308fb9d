//! Variable map type used throughout the engine.
//!
//! Variable names are case-sensitive and values are plain strings. The map
//! preserves insertion order so merge results iterate deterministically,
//! which keeps logs and persisted records stable across runs.

use indexmap::IndexMap;

/// An insertion-ordered mapping from variable name to value.
pub type VarMap = IndexMap<String, String>;

/// Build a [`VarMap`] from name/value pairs.
///
/// Convenience for callers assembling small fixed sets (trigger facts,
/// node identity, tests).
pub fn varmap<I, K, V>(entries: I) -> VarMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
