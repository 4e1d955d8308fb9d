//! Injection script execution.
//!
//! An injection script runs between the build-variable and property stages
//! with the environment merged so far. It reports variables back by writing
//! `KEY=VALUE` lines to the file named by `BUILDENV_RESULT`, which the
//! runner exports before spawning the script.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::InjectError;
use crate::properties::parse_properties;
use crate::resolve::expand;
use crate::vars::VarMap;

/// Name of the variable through which the runner hands the script its
/// result file.
pub const RESULT_FILE_VAR: &str = "BUILDENV_RESULT";

/// What to run: inline content, a script file, or both is rejected by the
/// pipeline configuration layer (content wins if both are set).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptSpec {
    /// Inline script content, passed to the shell verbatim.
    pub content: Option<String>,

    /// Path to a script file. May reference earlier variables
    /// (e.g. `${WORKSPACE}/inject.sh`).
    pub file: Option<PathBuf>,

    /// Shell override. Defaults to `/bin/sh` on Unix.
    pub shell: Option<String>,
}

/// Outcome of running an injection script.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    /// Process exit code. Zero means success; the pipeline treats anything
    /// else as a hard failure.
    pub exit_code: i32,

    /// Variables the script reported through its result file. Empty when
    /// the script wrote none or did not exit cleanly.
    pub vars: VarMap,
}

/// Collaborator that executes the configured injection script.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, spec: &ScriptSpec, env: &VarMap) -> Result<ScriptOutput, InjectError>;
}

/// Runs scripts through the system shell with the merged environment
/// applied on top of the runner's own process environment.
#[derive(Debug, Clone, Default)]
pub struct ShellScriptRunner;

#[async_trait]
impl ScriptRunner for ShellScriptRunner {
    async fn run(&self, spec: &ScriptSpec, env: &VarMap) -> Result<ScriptOutput, InjectError> {
        let result_file = tempfile::NamedTempFile::new()?;
        let result_path = result_file.path().to_path_buf();

        let mut command = match (&spec.content, &spec.file) {
            (Some(content), _) => {
                let (shell, args) = get_shell(spec.shell.as_deref());
                info!("executing inline injection script");
                let mut command = Command::new(shell);
                command.args(args).arg(content);
                command
            }
            (None, Some(file)) => {
                // The script file is handed to the shell as an argument, so
                // it does not need the executable bit
                let path = expand(&file.to_string_lossy(), env);
                let (shell, args) = get_file_shell(spec.shell.as_deref());
                info!(path, "executing injection script file");
                let mut command = Command::new(shell);
                command.args(args).arg(&path);
                command
            }
            (None, None) => {
                // Nothing configured; treat as a clean no-op run
                return Ok(ScriptOutput {
                    exit_code: 0,
                    vars: VarMap::new(),
                });
            }
        };

        for (key, value) in env {
            command.env(key, value);
        }
        command.env(RESULT_FILE_VAR, &result_path);

        let output = command.output().await?;
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.is_empty() {
                debug!(stderr = %stderr, "script stderr");
            }
            return Ok(ScriptOutput {
                exit_code,
                vars: VarMap::new(),
            });
        }

        let vars = match tokio::fs::read_to_string(&result_path).await {
            Ok(content) => parse_properties(&content),
            // Script exited cleanly without writing results
            Err(_) => VarMap::new(),
        };

        debug!(exit_code, count = vars.len(), "injection script finished");
        Ok(ScriptOutput { exit_code, vars })
    }
}

/// Shell command and argument vector for the current platform.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
    if let Some(shell) = override_shell {
        let args = if shell.contains("powershell") || shell.contains("pwsh") {
            vec!["-NoProfile".to_string(), "-Command".to_string()]
        } else if shell.contains("cmd") {
            vec!["/C".to_string()]
        } else {
            vec!["-c".to_string()]
        };
        return (shell.to_string(), args);
    }

    #[cfg(unix)]
    {
        ("/bin/sh".to_string(), vec!["-c".to_string()])
    }

    #[cfg(windows)]
    {
        (
            "powershell.exe".to_string(),
            vec![
                "-NoProfile".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-Command".to_string(),
            ],
        )
    }
}

/// Like [`get_shell`], but for running a script file rather than a command
/// string (`sh <path>` instead of `sh -c <string>`).
fn get_file_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
    if let Some(shell) = override_shell {
        let args = if shell.contains("powershell") || shell.contains("pwsh") {
            vec!["-NoProfile".to_string(), "-File".to_string()]
        } else if shell.contains("cmd") {
            vec!["/C".to_string()]
        } else {
            vec![]
        };
        return (shell.to_string(), args);
    }

    #[cfg(unix)]
    {
        ("/bin/sh".to_string(), vec![])
    }

    #[cfg(windows)]
    {
        (
            "powershell.exe".to_string(),
            vec![
                "-NoProfile".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-File".to_string(),
            ],
        )
    }
}

impl ScriptSpec {
    /// Inline script content.
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Script file on disk.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Default::default()
        }
    }

    /// True when neither content nor a file is configured.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.file.is_none()
    }
}
