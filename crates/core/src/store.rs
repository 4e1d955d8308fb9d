//! Per-build environment records.
//!
//! Each build owns exactly one [`EnvRecord`]. `upsert` either creates the
//! record or replaces its variables wholesale; there is no field-level merge
//! with the previous record. Readers observe either the old complete record
//! or the new one, never a mix.
//!
//! # Storage Layout (JSON store)
//!
//! ```text
//! <base_path>/
//! └── <build-id>.json    # One EnvRecord per build
//! ```

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::InjectError;
use crate::vars::VarMap;

/// The persisted environment of one build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvRecord {
    pub build_id: String,
    pub vars: VarMap,
}

/// Build-scoped persistence for resolved environments.
///
/// `upsert` must be atomic per build id; each id is logically owned by one
/// in-flight pipeline at a time, so no further locking is required.
pub trait EnvStore: Send + Sync {
    /// Create the record for `build_id`, or replace its entire content.
    fn upsert(&self, build_id: &str, vars: VarMap) -> Result<(), InjectError>;

    /// The recorded environment, if any. Used by child builds and by
    /// inspection tooling.
    fn get(&self, build_id: &str) -> Result<Option<VarMap>, InjectError>;
}

/// In-memory store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryEnvStore {
    records: RwLock<HashMap<String, EnvRecord>>,
}

impl MemoryEnvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EnvStore for MemoryEnvStore {
    fn upsert(&self, build_id: &str, vars: VarMap) -> Result<(), InjectError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| InjectError::Store(e.to_string()))?;
        records.insert(
            build_id.to_string(),
            EnvRecord {
                build_id: build_id.to_string(),
                vars,
            },
        );
        Ok(())
    }

    fn get(&self, build_id: &str) -> Result<Option<VarMap>, InjectError> {
        let records = self
            .records
            .read()
            .map_err(|e| InjectError::Store(e.to_string()))?;
        Ok(records.get(build_id).map(|r| r.vars.clone()))
    }
}

/// On-disk store writing one pretty-printed JSON file per build.
///
/// Writes go through a temp file and rename, so a concurrent reader sees
/// either the previous complete record or the new one.
#[derive(Debug, Clone)]
pub struct JsonEnvStore {
    base_path: PathBuf,
}

impl JsonEnvStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn record_path(&self, build_id: &str) -> PathBuf {
        self.base_path.join(format!("{build_id}.json"))
    }
}

impl EnvStore for JsonEnvStore {
    fn upsert(&self, build_id: &str, vars: VarMap) -> Result<(), InjectError> {
        fs::create_dir_all(&self.base_path)?;

        let record = EnvRecord {
            build_id: build_id.to_string(),
            vars,
        };

        let path = self.record_path(build_id);
        let temp_path = self.base_path.join(format!("{build_id}.json.tmp"));

        let content = serde_json::to_string_pretty(&record)
            .map_err(|e| InjectError::Store(e.to_string()))?;
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, &path)?;

        debug!(build_id, path = %path.display(), "recorded build environment");
        Ok(())
    }

    fn get(&self, build_id: &str) -> Result<Option<VarMap>, InjectError> {
        let path = self.record_path(build_id);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: EnvRecord =
            serde_json::from_str(&content).map_err(|e| InjectError::Store(e.to_string()))?;
        Ok(Some(record.vars))
    }
}
