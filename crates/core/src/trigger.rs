//! Trigger-cause facts.
//!
//! A build may be triggered by one or more causes (a person, a timer, an
//! upstream build, a source-control change). The causes are folded into the
//! injected environment as `BUILD_CAUSE` plus one boolean-valued variable
//! per cause present, so scripts can branch on why the build ran.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vars::VarMap;

/// What caused a build to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Manual,
    Timer,
    Upstream,
    Scm,
    Other,
}

impl TriggerKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Manual => "MANUALTRIGGER",
            TriggerKind::Timer => "TIMERTRIGGER",
            TriggerKind::Upstream => "UPSTREAMTRIGGER",
            TriggerKind::Scm => "SCMTRIGGER",
            TriggerKind::Other => "OTHERTRIGGER",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Render trigger causes as injectable variables.
///
/// Produces `BUILD_CAUSE` (comma-joined cause names in the order given) and
/// `BUILD_CAUSE_<KIND>=true` for each cause present. Duplicate causes
/// collapse to one entry. An empty cause list yields an empty map.
pub fn trigger_vars(triggers: &[TriggerKind]) -> VarMap {
    let mut vars = VarMap::new();
    if triggers.is_empty() {
        return vars;
    }

    let mut seen = Vec::new();
    for trigger in triggers {
        if !seen.contains(trigger) {
            seen.push(*trigger);
        }
    }

    let joined = seen
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(",");
    vars.insert("BUILD_CAUSE".to_string(), joined);

    for trigger in &seen {
        vars.insert(format!("BUILD_CAUSE_{trigger}"), "true".to_string());
    }

    vars
}
