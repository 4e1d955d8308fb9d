//! The injection pipeline.
//!
//! One [`Pipeline`] instance is configured per job and drives the fixed
//! stage order for each build:
//!
//! ```text
//! Infra -> BuildVars -> Script -> Properties -> Contributions -> Resolve -> Persist
//! ```
//!
//! Stages always execute in this order; each one appends a [`SourceSet`] to
//! the precedence list, so later origins override earlier ones. Any stage
//! failing aborts the run without persisting anything. Child builds take a
//! shorter path that copies the parent's recorded environment instead of
//! collecting anything.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use buildenv_platform::{NodeInfo, system_env};

use crate::contrib::{Contributor, collect_contributions};
use crate::error::InjectError;
use crate::mask::{SecretProvider, mask_secrets};
use crate::properties::{InlineProperties, PropertiesFile, PropertySource};
use crate::resolve::resolve;
use crate::script::{ScriptRunner, ScriptSpec, ShellScriptRunner};
use crate::source::{SourceKind, SourceSet, merge_into, merge_sources};
use crate::store::EnvStore;
use crate::trigger::{TriggerKind, trigger_vars};
use crate::vars::VarMap;

fn default_true() -> bool {
    true
}

/// Per-job injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionConfig {
    /// Master switch. A disabled pipeline is a no-op, not a failure.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Keep node facts and the process environment snapshot.
    #[serde(default = "default_true")]
    pub keep_system_vars: bool,

    /// Keep build parameters handed over by the host.
    #[serde(default = "default_true")]
    pub keep_build_vars: bool,

    /// Emit `BUILD_CAUSE` variables describing what triggered the build.
    #[serde(default = "default_true")]
    pub populate_trigger_vars: bool,

    /// Optional injection script.
    #[serde(default)]
    pub script: Option<ScriptSpec>,

    /// Property files to load, in order. Paths may reference earlier
    /// variables.
    #[serde(default)]
    pub properties_files: Vec<PathBuf>,

    /// Inline `KEY=VALUE` content, loaded after the files.
    #[serde(default)]
    pub properties_content: Option<String>,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keep_system_vars: true,
            keep_build_vars: true,
            populate_trigger_vars: true,
            script: None,
            properties_files: Vec::new(),
            properties_content: None,
        }
    }
}

/// Everything the pipeline knows about the build it runs for.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub build_id: String,
    pub workspace: Option<PathBuf>,
    pub params: VarMap,
    pub triggers: Vec<TriggerKind>,
    cancelled: Arc<AtomicBool>,
}

impl BuildContext {
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            workspace: None,
            params: VarMap::new(),
            triggers: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_params(mut self, params: VarMap) -> Self {
        self.params = params;
        self
    }

    pub fn with_triggers(mut self, triggers: Vec<TriggerKind>) -> Self {
        self.triggers = triggers;
        self
    }

    /// Mark the enclosing build as aborted. The pipeline stops at the next
    /// stage boundary and persists nothing.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a pipeline run ended (other than with an error).
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The resolved environment, as persisted.
    Injected(VarMap),
    /// Injection is disabled for this build; nothing was collected or
    /// persisted.
    Skipped,
}

impl RunOutcome {
    pub fn injected(&self) -> Option<&VarMap> {
        match self {
            RunOutcome::Injected(vars) => Some(vars),
            RunOutcome::Skipped => None,
        }
    }
}

/// Drives environment injection for builds of one job.
///
/// Holds no per-build state; many builds may run through clones of the same
/// pipeline concurrently, each with its own [`BuildContext`].
pub struct Pipeline {
    config: InjectionConfig,
    store: Arc<dyn EnvStore>,
    script_runner: Arc<dyn ScriptRunner>,
    contributors: Vec<Arc<dyn Contributor>>,
}

impl Pipeline {
    pub fn new(config: InjectionConfig, store: Arc<dyn EnvStore>) -> Self {
        Self {
            config,
            store,
            script_runner: Arc::new(ShellScriptRunner),
            contributors: Vec::new(),
        }
    }

    /// Replace the script execution collaborator (tests, remote agents).
    pub fn with_script_runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.script_runner = runner;
        self
    }

    /// Register a contributor. Contributors are queried in registration
    /// order; later ones override earlier ones.
    pub fn with_contributor(mut self, contributor: Arc<dyn Contributor>) -> Self {
        self.contributors.push(contributor);
        self
    }

    /// Run the full pipeline for a non-child build.
    pub async fn run(&self, ctx: &BuildContext) -> Result<RunOutcome, InjectError> {
        if !self.config.enabled {
            info!(build_id = %ctx.build_id, "environment injection disabled, skipping");
            return Ok(RunOutcome::Skipped);
        }

        info!(build_id = %ctx.build_id, "preparing build environment");
        let mut sources = Vec::new();

        // Infra
        sources.push(self.collect_infra()?);
        self.check_cancelled(ctx)?;

        // BuildVars (+ trigger facts)
        if self.config.populate_trigger_vars {
            sources.push(SourceSet::new(
                SourceKind::TriggerCause,
                trigger_vars(&ctx.triggers),
            ));
        }
        sources.push(self.collect_build_vars(ctx));
        self.check_cancelled(ctx)?;

        // Script
        if let Some(spec) = &self.config.script
            && !spec.is_empty()
        {
            let merged = merge_sources(&sources);
            let output = self.script_runner.run(spec, &merged).await?;
            if output.exit_code != 0 {
                error!(
                    build_id = %ctx.build_id,
                    code = output.exit_code,
                    "injection script failed, marking build failed"
                );
                return Err(InjectError::ScriptFailed {
                    code: output.exit_code,
                });
            }
            sources.push(SourceSet::new(SourceKind::ScriptProduced, output.vars));
        }
        self.check_cancelled(ctx)?;

        // Properties
        let property_vars = self.collect_properties(&merge_sources(&sources)).await?;
        sources.push(SourceSet::new(SourceKind::PropertyFile, property_vars));
        self.check_cancelled(ctx)?;

        // Contributions
        let contributed = collect_contributions(&self.contributors, ctx).await?;
        sources.push(SourceSet::new(SourceKind::Contribution, contributed));
        self.check_cancelled(ctx)?;

        // Resolve
        let resolved = resolve(&merge_sources(&sources));
        self.check_cancelled(ctx)?;

        // Persist
        self.store.upsert(&ctx.build_id, resolved.clone())?;
        info!(
            build_id = %ctx.build_id,
            count = resolved.len(),
            "build environment recorded"
        );

        Ok(RunOutcome::Injected(resolved))
    }

    /// Shorter path for child builds of an aggregate: the parent's recorded
    /// environment becomes the child's, verbatim. No collection stages run.
    pub async fn run_child(
        &self,
        ctx: &BuildContext,
        parent_id: &str,
    ) -> Result<RunOutcome, InjectError> {
        if !self.config.enabled {
            info!(build_id = %ctx.build_id, "environment injection disabled, skipping");
            return Ok(RunOutcome::Skipped);
        }

        info!(
            build_id = %ctx.build_id,
            parent_id,
            "inheriting environment from parent build"
        );

        let vars = self
            .store
            .get(parent_id)?
            .ok_or_else(|| InjectError::MissingParent(parent_id.to_string()))?;

        self.check_cancelled(ctx)?;
        self.store.upsert(&ctx.build_id, vars.clone())?;

        Ok(RunOutcome::Injected(vars))
    }

    /// Build-completion hook: overwrite secret-named variables in the
    /// recorded environment with their masked representation.
    ///
    /// A build without a record (failed or skipped pipeline) is left alone.
    pub fn complete(
        &self,
        build_id: &str,
        secrets: &dyn SecretProvider,
    ) -> Result<(), InjectError> {
        let Some(mut vars) = self.store.get(build_id)? else {
            debug!(build_id, "no environment recorded, nothing to mask");
            return Ok(());
        };

        mask_secrets(&mut vars, secrets);
        self.store.upsert(build_id, vars)
    }

    fn check_cancelled(&self, ctx: &BuildContext) -> Result<(), InjectError> {
        if ctx.is_cancelled() {
            info!(build_id = %ctx.build_id, "build aborted, discarding collected variables");
            return Err(InjectError::Cancelled);
        }
        Ok(())
    }

    fn collect_infra(&self) -> Result<SourceSet, InjectError> {
        if !self.config.keep_system_vars {
            debug!("system variables dropped by policy");
            return Ok(SourceSet::empty(SourceKind::System));
        }

        let mut vars = system_env();
        let node = NodeInfo::detect()?;
        merge_into(&mut vars, &node.as_vars());
        debug!(count = vars.len(), "collected system variables");
        Ok(SourceSet::new(SourceKind::System, vars))
    }

    fn collect_build_vars(&self, ctx: &BuildContext) -> SourceSet {
        let mut vars = VarMap::new();

        if self.config.keep_build_vars {
            merge_into(&mut vars, &ctx.params);
        } else {
            debug!("build parameters dropped by policy");
        }

        if let Some(workspace) = &ctx.workspace {
            vars.insert(
                "WORKSPACE".to_string(),
                workspace.to_string_lossy().to_string(),
            );
        }
        vars.insert("BUILD_ID".to_string(), ctx.build_id.clone());

        SourceSet::new(SourceKind::BuildParameter, vars)
    }

    async fn collect_properties(&self, ctx_env: &VarMap) -> Result<VarMap, InjectError> {
        let mut merged = VarMap::new();

        for path in &self.config.properties_files {
            let source = PropertiesFile::new(path.clone());
            let vars = source.load(ctx_env).await?;
            merge_into(&mut merged, &vars);
        }

        if let Some(content) = &self.config.properties_content {
            let source = InlineProperties::new(content.clone());
            merge_into(&mut merged, &source.load(ctx_env).await?);
        }

        Ok(merged)
    }
}
