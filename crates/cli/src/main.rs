use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::{Term, style};
use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use buildenv_core::{
    BuildContext, EnvStore, InjectionConfig, JsonEnvStore, Pipeline, SecretEntry, StaticSecrets,
    TriggerKind, VarMap,
};
use buildenv_platform::NodeInfo;

/// buildenv - build environment injection
#[derive(Parser)]
#[command(name = "buildenv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding recorded build environments
    #[arg(long, global = true, default_value = ".buildenv")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the injection pipeline for a build
    Run {
        /// Path to the job configuration file (default: buildenv.toml)
        #[arg(default_value = "buildenv.toml")]
        config: PathBuf,

        /// Build identifier (overrides the config file)
        #[arg(short, long)]
        build_id: Option<String>,
    },

    /// Copy a parent build's recorded environment to a child build
    Child {
        /// Child build identifier
        build_id: String,

        /// Parent build identifier
        parent_id: String,
    },

    /// Print the recorded environment of a build
    Show {
        /// Build identifier
        build_id: String,

        /// Emit the record as JSON instead of KEY=VALUE lines
        #[arg(long)]
        json: bool,
    },

    /// Show node facts that would be injected
    Node,
}

/// On-disk job configuration: the injection settings plus everything the
/// host would normally hand over per build.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobConfig {
    #[serde(default)]
    build_id: Option<String>,

    #[serde(default)]
    workspace: Option<PathBuf>,

    #[serde(default)]
    params: VarMap,

    #[serde(default)]
    triggers: Vec<TriggerKind>,

    #[serde(default)]
    secrets: Vec<SecretEntry>,

    #[serde(default)]
    injection: Option<InjectionConfig>,
}

impl JobConfig {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .without_time()
        .init();

    let cli = Cli::parse();
    let store = Arc::new(JsonEnvStore::new(cli.store));

    match cli.command {
        Commands::Run { config, build_id } => cmd_run(&config, build_id, store).await,
        Commands::Child {
            build_id,
            parent_id,
        } => cmd_child(&build_id, &parent_id, store).await,
        Commands::Show { build_id, json } => cmd_show(&build_id, json, store),
        Commands::Node => cmd_node(),
    }
}

async fn cmd_run(
    config_path: &Path,
    build_id: Option<String>,
    store: Arc<JsonEnvStore>,
) -> Result<()> {
    let term = Term::stderr();

    if !config_path.exists() {
        term.write_line(&format!(
            "{} Config file not found: {}",
            style("error:").red().bold(),
            config_path.display()
        ))?;
        std::process::exit(1);
    }

    let job = JobConfig::load(config_path)?;
    debug!(config = %config_path.display(), "loaded job configuration");
    let build_id = build_id
        .or(job.build_id)
        .context("no build id: pass --build-id or set build_id in the config")?;

    term.write_line(&format!(
        "{} Preparing environment for build {}",
        style("::").cyan().bold(),
        build_id
    ))?;

    let mut ctx = BuildContext::new(&build_id).with_params(job.params);
    if let Some(workspace) = job.workspace {
        ctx = ctx.with_workspace(workspace);
    }
    ctx = ctx.with_triggers(job.triggers);

    let pipeline = Pipeline::new(job.injection.unwrap_or_default(), store);

    let outcome = match pipeline.run(&ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            term.write_line(&format!(
                "{} Injection failed: {}",
                style("error:").red().bold(),
                e
            ))?;
            std::process::exit(1);
        }
    };

    let Some(vars) = outcome.injected() else {
        term.write_line(&format!(
            "{} Injection disabled for this job, nothing recorded",
            style("::").cyan().bold()
        ))?;
        return Ok(());
    };

    // A CLI run is also the build's completion, so mask right away
    if !job.secrets.is_empty() {
        info!(build_id = %build_id, count = job.secrets.len(), "masking configured secrets");
        pipeline.complete(&build_id, &StaticSecrets::new(job.secrets))?;
    }

    term.write_line(&format!(
        "{} Recorded {} variable(s) for build {}",
        style("::").green().bold(),
        vars.len(),
        build_id
    ))?;

    Ok(())
}

async fn cmd_child(build_id: &str, parent_id: &str, store: Arc<JsonEnvStore>) -> Result<()> {
    let term = Term::stderr();

    let pipeline = Pipeline::new(InjectionConfig::default(), store);
    let ctx = BuildContext::new(build_id);

    match pipeline.run_child(&ctx, parent_id).await {
        Ok(outcome) => {
            let count = outcome.injected().map(VarMap::len).unwrap_or(0);
            term.write_line(&format!(
                "{} Build {} inherited {} variable(s) from {}",
                style("::").green().bold(),
                build_id,
                count,
                parent_id
            ))?;
            Ok(())
        }
        Err(e) => {
            term.write_line(&format!(
                "{} Inheritance failed: {}",
                style("error:").red().bold(),
                e
            ))?;
            std::process::exit(1);
        }
    }
}

fn cmd_show(build_id: &str, json: bool, store: Arc<JsonEnvStore>) -> Result<()> {
    let term = Term::stderr();

    let Some(vars) = store.get(build_id)? else {
        term.write_line(&format!(
            "{} No environment recorded for build {}",
            style("error:").red().bold(),
            build_id
        ))?;
        std::process::exit(1);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&vars)?);
    } else {
        for (name, value) in &vars {
            println!("{name}={value}");
        }
    }

    Ok(())
}

fn cmd_node() -> Result<()> {
    let term = Term::stderr();
    let node = NodeInfo::detect()?;

    term.write_line(&format!(
        "{} buildenv v{}",
        style("::").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    ))?;
    term.write_line("")?;
    for (name, value) in &node.as_vars() {
        term.write_line(&format!("  {name:<14} {value}"))?;
    }

    Ok(())
}
