//! The external validation tool.
//!
//! The oracle evaluates a project directory and prints a JSON description of
//! what it understood. It knows nothing about source positions; the result is
//! a [`SemanticValue`] that the reconciler correlates back onto the text.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use blockyard_core::SemanticValue;
use tokio::process::Command;

use crate::config::OracleConfig;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("no project root found for document")]
    NoProjectRoot,

    #[error("validation oracle is disabled")]
    Disabled,

    #[error("oracle command `{command}` not found")]
    Missing { command: String },

    #[error("failed to run oracle: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("oracle exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("oracle produced no output")]
    Empty,

    #[error("oracle output is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("oracle output is not an object")]
    Shape,
}

/// Something that can produce a semantic snapshot for a project.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Evaluate the project at `root`, optionally narrowed to one block.
    async fn evaluate(&self, root: &Path, entity: Option<&str>)
        -> Result<SemanticValue, OracleError>;
}

/// Runs the configured command as a child process.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    config: OracleConfig,
}

impl CommandOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }

    fn command(&self, root: &Path, entity: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);
        if let (Some(flag), Some(entity)) = (&self.config.entity_flag, entity) {
            cmd.arg(flag).arg(entity);
        }
        cmd.current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Oracle for CommandOracle {
    async fn evaluate(
        &self,
        root: &Path,
        entity: Option<&str>,
    ) -> Result<SemanticValue, OracleError> {
        if !self.config.enabled {
            return Err(OracleError::Disabled);
        }
        tracing::debug!(command = %self.config.command, root = %root.display(), ?entity, "running oracle");
        let output = self
            .command(root, entity)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => OracleError::Missing {
                    command: self.config.command.clone(),
                },
                _ => OracleError::Spawn(e),
            })?;

        if !output.status.success() {
            return Err(OracleError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// An oracle that is never available. Used when no command is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOracle;

#[async_trait]
impl Oracle for DisabledOracle {
    async fn evaluate(&self, _: &Path, _: Option<&str>) -> Result<SemanticValue, OracleError> {
        Err(OracleError::Disabled)
    }
}

/// Parse oracle stdout. The top level must be an object.
pub fn parse_output(stdout: &str) -> Result<SemanticValue, OracleError> {
    let value = SemanticValue::from_json_str(stdout)?.ok_or(OracleError::Empty)?;
    if value.is_mapping() {
        Ok(value)
    } else {
        Err(OracleError::Shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_must_be_a_mapping() {
        assert!(matches!(parse_output("  \n"), Err(OracleError::Empty)));
        assert!(matches!(parse_output("[1, 2]"), Err(OracleError::Shape)));
        assert!(matches!(parse_output("{ nope"), Err(OracleError::Malformed(_))));
        let value = parse_output(r#"{"name": "platform"}"#).unwrap();
        assert_eq!(value.get("name").as_str(), Some("platform"));
    }

    #[tokio::test]
    async fn missing_binary_is_reported_by_name() {
        let oracle = CommandOracle::new(OracleConfig {
            command: "blockyard-no-such-oracle".to_string(),
            ..OracleConfig::default()
        });
        let err = oracle
            .evaluate(&std::env::temp_dir(), None)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, OracleError::Missing { command } if command == "blockyard-no-such-oracle"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn disabled_config_never_spawns() {
        let oracle = CommandOracle::new(OracleConfig {
            enabled: false,
            command: "blockyard-no-such-oracle".to_string(),
            ..OracleConfig::default()
        });
        let err = oracle.evaluate(Path::new("/"), None).await.unwrap_err();
        assert!(matches!(err, OracleError::Disabled));
    }
}
