//! Node identity and system environment snapshot
//!
//! Builds observe the node they run on through a small set of facts
//! (`NODE_NAME`, `NODE_USER`, ...) plus a snapshot of the process
//! environment. Both are gathered here so the injection engine never
//! touches `std::env` directly.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::PlatformError;

/// Identity of the node a build executes on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Platform label in `<arch>-<os>` form (e.g. `x86_64-linux`)
    pub platform: String,
    pub hostname: String,
    pub username: String,
}

impl NodeInfo {
    /// Gather current node information
    pub fn detect() -> Result<Self, PlatformError> {
        Ok(Self {
            platform: platform_label(),
            hostname: whoami::fallible::hostname()
                .map_err(|e| PlatformError::Hostname(e.to_string()))?,
            username: whoami::fallible::username()
                .map_err(|e| PlatformError::Username(e.to_string()))?,
        })
    }

    /// Render the node identity as injectable variables
    pub fn as_vars(&self) -> IndexMap<String, String> {
        let mut vars = IndexMap::new();
        vars.insert("NODE_NAME".to_string(), self.hostname.clone());
        vars.insert("NODE_USER".to_string(), self.username.clone());
        vars.insert("NODE_PLATFORM".to_string(), self.platform.clone());
        vars
    }
}

/// The platform label for the current node. Follows the common
/// `<arch>-<os>` labeling, with macOS reported as `darwin`.
pub fn platform_label() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{}-{}", std::env::consts::ARCH, os)
}

/// Snapshot the current process environment.
///
/// Non-UTF8 entries are skipped; builds cannot reference them by name anyway.
pub fn system_env() -> IndexMap<String, String> {
    let vars: IndexMap<String, String> = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();
    debug!(count = vars.len(), "captured process environment");
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_info_vars() {
        let info = NodeInfo {
            platform: platform_label(),
            hostname: "builder-01".to_string(),
            username: "ci".to_string(),
        };

        let vars = info.as_vars();
        assert_eq!(vars.get("NODE_NAME").unwrap(), "builder-01");
        assert_eq!(vars.get("NODE_USER").unwrap(), "ci");
        assert!(vars.get("NODE_PLATFORM").unwrap().contains('-'));
    }

    #[test]
    fn test_platform_label_format() {
        let label = platform_label();
        assert!(label.contains('-'));
        // macOS is labeled darwin in platform strings
        assert!(!label.ends_with("macos"));
    }

    #[test]
    fn test_system_env_snapshot() {
        // PATH is present in any sane test environment
        let vars = system_env();
        assert!(!vars.is_empty());
    }
}
