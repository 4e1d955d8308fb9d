//! Secret masking at build completion.
//!
//! Before a build's final environment is recorded for inspection, every
//! registered secret overwrites any same-named variable with its masked
//! representation. Masking always wins over other sources. A provider that
//! cannot list its secrets only costs a warning; completion proceeds with
//! nothing masked.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::vars::VarMap;

/// One registered secret: the variable name and the representation safe to
/// record in its place (an encrypted form, a fixed mask, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretEntry {
    pub name: String,
    pub masked: String,
}

/// Error type for secret listing; never fatal to the caller.
pub type SecretError = Box<dyn std::error::Error + Send + Sync>;

/// Collaborator listing the secrets registered for this host.
///
/// Read by every pipeline at completion time; implementations must be safe
/// for concurrent use.
pub trait SecretProvider: Send + Sync {
    fn secrets(&self) -> Result<Vec<SecretEntry>, SecretError>;
}

/// A fixed, in-memory secret list.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    entries: Vec<SecretEntry>,
}

impl StaticSecrets {
    pub fn new(entries: Vec<SecretEntry>) -> Self {
        Self { entries }
    }
}

impl SecretProvider for StaticSecrets {
    fn secrets(&self) -> Result<Vec<SecretEntry>, SecretError> {
        Ok(self.entries.clone())
    }
}

/// Overwrite secret-named variables in `env` with their masked form.
///
/// Entries are applied unconditionally: a secret's name is set even when no
/// other source produced that variable.
pub fn mask_secrets(env: &mut VarMap, provider: &dyn SecretProvider) {
    let entries = match provider.secrets() {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "could not list secrets, masking skipped");
            return;
        }
    };

    for entry in &entries {
        env.insert(entry.name.clone(), entry.masked.clone());
    }
    debug!(count = entries.len(), "masked secret variables");
}
