//! Origin-tagged variable batches and the precedence merge.
//!
//! Each stage of the pipeline produces one [`SourceSet`]: a batch of
//! variables tagged with where they came from. The merge is a plain
//! last-write-wins fold over an ordered list; there is no key deletion,
//! only presence and overwrite.

use std::fmt;

use crate::vars::VarMap;

/// Where a batch of variables originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Node facts and the process environment snapshot
    System,
    /// What caused the build to run
    TriggerCause,
    /// Build parameters and workspace facts
    BuildParameter,
    /// Variables reported by the injection script
    ScriptProduced,
    /// Variables parsed from property files or inline content
    PropertyFile,
    /// Variables supplied by registered contributors
    Contribution,
}

impl SourceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SourceKind::System => "system",
            SourceKind::TriggerCause => "trigger-cause",
            SourceKind::BuildParameter => "build-parameter",
            SourceKind::ScriptProduced => "script",
            SourceKind::PropertyFile => "property-file",
            SourceKind::Contribution => "contribution",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One batch of variables from a single origin. Immutable once produced.
#[derive(Debug, Clone)]
pub struct SourceSet {
    pub kind: SourceKind,
    pub vars: VarMap,
}

impl SourceSet {
    pub fn new(kind: SourceKind, vars: VarMap) -> Self {
        Self { kind, vars }
    }

    /// An origin that produced nothing (e.g. system vars disabled by policy).
    pub fn empty(kind: SourceKind) -> Self {
        Self {
            kind,
            vars: VarMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Merge an ordered list of source sets into one map.
///
/// Sources are folded in list order; a key present in a later source
/// unconditionally overwrites the value from an earlier one. An empty list
/// yields an empty map.
pub fn merge_sources(sources: &[SourceSet]) -> VarMap {
    let mut merged = VarMap::new();
    for source in sources {
        merge_into(&mut merged, &source.vars);
    }
    merged
}

/// Overlay `overrides` onto `base`, later keys winning.
pub fn merge_into(base: &mut VarMap, overrides: &VarMap) {
    for (key, value) in overrides {
        base.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::varmap;

    #[test]
    fn later_source_overrides_earlier() {
        let sources = vec![
            SourceSet::new(SourceKind::System, varmap([("WS", "/a")])),
            SourceSet::new(SourceKind::BuildParameter, varmap([("WS", "/b")])),
        ];

        let merged = merge_sources(&sources);
        assert_eq!(merged.get("WS").unwrap(), "/b");
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn empty_precedence_list_yields_empty_map() {
        assert!(merge_sources(&[]).is_empty());
    }

    #[test]
    fn merge_is_deterministic() {
        let sources = vec![
            SourceSet::new(SourceKind::System, varmap([("A", "1"), ("B", "2")])),
            SourceSet::new(SourceKind::PropertyFile, varmap([("B", "3"), ("C", "4")])),
        ];

        let first = merge_sources(&sources);
        let second = merge_sources(&sources);
        assert_eq!(first, second);

        let keys: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        assert_eq!(first.get("B").unwrap(), "3");
    }

    #[test]
    fn disjoint_sources_accumulate() {
        let sources = vec![
            SourceSet::new(SourceKind::System, varmap([("HOME", "/home/ci")])),
            SourceSet::empty(SourceKind::TriggerCause),
            SourceSet::new(SourceKind::ScriptProduced, varmap([("VERSION", "1.2.3")])),
        ];

        let merged = merge_sources(&sources);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("HOME").unwrap(), "/home/ci");
        assert_eq!(merged.get("VERSION").unwrap(), "1.2.3");
    }
}
