//! buildenv-core: environment injection engine
//!
//! This crate collects environment variables for a build from a fixed set of
//! origins (node facts, build parameters, trigger causes, an injection
//! script, property files, registered contributors), merges them under a
//! deterministic precedence order, resolves `${NAME}` references between
//! values, and persists the result per build so later stages and child
//! builds observe a consistent snapshot.

pub mod contrib;
pub mod error;
pub mod mask;
pub mod pipeline;
pub mod properties;
pub mod resolve;
pub mod script;
pub mod source;
pub mod store;
pub mod trigger;
pub mod vars;

pub use contrib::Contributor;
pub use error::InjectError;
pub use mask::{SecretEntry, SecretError, SecretProvider, StaticSecrets, mask_secrets};
pub use pipeline::{BuildContext, InjectionConfig, Pipeline, RunOutcome};
pub use properties::{InlineProperties, PropertiesFile, PropertySource, parse_properties};
pub use resolve::{expand, resolve};
pub use script::{ScriptOutput, ScriptRunner, ScriptSpec, ShellScriptRunner};
pub use source::{SourceKind, SourceSet, merge_into, merge_sources};
pub use store::{EnvRecord, EnvStore, JsonEnvStore, MemoryEnvStore};
pub use trigger::{TriggerKind, trigger_vars};
pub use vars::{VarMap, varmap};

/// Result type for injection operations
pub type Result<T> = std::result::Result<T, InjectError>;
