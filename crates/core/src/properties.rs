//! Property sources: `KEY=VALUE` text from files or inline content.
//!
//! Property sources are loaded after the injection script ran, seeded with
//! the environment merged so far, so a configured file path like
//! `${WORKSPACE}/build.properties` resolves against earlier variables.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::InjectError;
use crate::resolve::expand;
use crate::vars::VarMap;

/// Parse `KEY=VALUE`-per-line text.
///
/// Lines without a `=` separator are ignored, as are blank lines and `#`
/// comments. Keys and values are trimmed. A key appearing on multiple lines
/// keeps the last value.
pub fn parse_properties(content: &str) -> VarMap {
    let mut vars = VarMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            debug!(line, "skipping line without separator");
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            warn!(line, "skipping property with empty name");
            continue;
        }

        vars.insert(key.to_string(), value.trim().to_string());
    }

    vars
}

/// A collaborator producing property-file variables for the pipeline.
#[async_trait]
pub trait PropertySource: Send + Sync {
    /// Human-readable identity for logs and error messages.
    fn describe(&self) -> String;

    /// Load and parse this source, seeded with the environment merged so
    /// far. I/O failures are fatal to the pipeline.
    async fn load(&self, ctx: &VarMap) -> Result<VarMap, InjectError>;
}

/// A `KEY=VALUE` file on disk. The configured path may reference earlier
/// variables (e.g. `${WORKSPACE}/build.properties`).
#[derive(Debug, Clone)]
pub struct PropertiesFile {
    pub path: PathBuf,
}

impl PropertiesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PropertySource for PropertiesFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self, ctx: &VarMap) -> Result<VarMap, InjectError> {
        let path = expand(&self.path.to_string_lossy(), ctx);

        let content =
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| InjectError::Properties {
                    path: path.clone(),
                    message: e.to_string(),
                })?;

        let vars = parse_properties(&content);
        debug!(path, count = vars.len(), "loaded properties file");
        Ok(vars)
    }
}

/// Inline `KEY=VALUE` content supplied directly in the configuration.
#[derive(Debug, Clone)]
pub struct InlineProperties {
    pub content: String,
}

impl InlineProperties {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[async_trait]
impl PropertySource for InlineProperties {
    fn describe(&self) -> String {
        "<inline properties>".to_string()
    }

    async fn load(&self, _ctx: &VarMap) -> Result<VarMap, InjectError> {
        Ok(parse_properties(&self.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::varmap;

    #[test]
    fn parses_simple_pairs() {
        let vars = parse_properties("A=1\nB=two\n");
        assert_eq!(vars.get("A").unwrap(), "1");
        assert_eq!(vars.get("B").unwrap(), "two");
    }

    #[test]
    fn ignores_lines_without_separator() {
        let vars = parse_properties("A=1\nnot a property\nB=2");
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn ignores_comments_and_blanks() {
        let vars = parse_properties("# header\n\nA=1\n   \n# B=2\n");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("A").unwrap(), "1");
    }

    #[test]
    fn last_duplicate_wins() {
        let vars = parse_properties("A=first\nA=second");
        assert_eq!(vars.get("A").unwrap(), "second");
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn trims_keys_and_values() {
        let vars = parse_properties("  SPACED  =  value  ");
        assert_eq!(vars.get("SPACED").unwrap(), "value");
    }

    #[test]
    fn value_may_contain_equals() {
        let vars = parse_properties("OPTS=-Da=b -Dc=d");
        assert_eq!(vars.get("OPTS").unwrap(), "-Da=b -Dc=d");
    }

    #[test]
    fn empty_key_ignored() {
        let vars = parse_properties("=value");
        assert!(vars.is_empty());
    }

    #[tokio::test]
    async fn file_source_expands_path_from_context() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("build.properties"), "VERSION=1.2.3\n")
            .await
            .unwrap();

        let ctx = varmap([("WORKSPACE", dir.path().to_string_lossy())]);
        let source = PropertiesFile::new("${WORKSPACE}/build.properties");

        let vars = source.load(&ctx).await.unwrap();
        assert_eq!(vars.get("VERSION").unwrap(), "1.2.3");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let source = PropertiesFile::new("/definitely/not/here.properties");
        let result = source.load(&VarMap::new()).await;
        assert!(matches!(result, Err(InjectError::Properties { .. })));
    }

    #[tokio::test]
    async fn inline_source_parses_content() {
        let source = InlineProperties::new("A=1\nB=${A}");
        let vars = source.load(&VarMap::new()).await.unwrap();
        assert_eq!(vars.get("B").unwrap(), "${A}");
    }
}
