//! Migration execution seam
//!
//! The orchestrator hands one migration file at a time to a
//! [`MigrationExecutor`]. [`CommandExecutor`] shells out to the migration CLI.

use crate::catalog::MigrationDescriptor;
use crate::config::{MigrateConfig, Secret};
use crate::error::ExecutionError;
use crate::types::EnvironmentId;
use async_trait::async_trait;
use std::process::Stdio;

/// Where a migration is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTarget {
    /// Space id
    pub space_id: String,
    /// Environment being migrated
    pub environment: EnvironmentId,
    /// Credential for the executor
    pub access_token: Secret,
}

impl MigrationTarget {
    /// Target `environment` in the configured space
    #[must_use]
    pub fn new(config: &MigrateConfig, environment: EnvironmentId) -> Self {
        Self {
            space_id: config.space_id.clone(),
            environment,
            access_token: config.management_token.clone(),
        }
    }
}

/// Applies a single migration
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MigrationExecutor: Send + Sync {
    /// Apply `migration` to `target`; returns once it has fully applied or failed
    async fn execute(
        &self,
        migration: &MigrationDescriptor,
        target: &MigrationTarget,
    ) -> Result<(), ExecutionError>;
}

/// Runs an external migration program once per file
///
/// Invocation: `<program> [args..] --space-id S --environment-id E
/// --management-token T --yes <file>`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    /// Executor for `program`
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Executor for the configured migration command
    ///
    /// The command is split on whitespace so `npx contentful-migration` works.
    #[must_use]
    pub fn from_config(config: &MigrateConfig) -> Self {
        let mut parts = config.migration_command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "contentful-migration".to_string());
        Self {
            program,
            args: parts.collect(),
        }
    }

    /// Program that will be spawned
    #[inline]
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl MigrationExecutor for CommandExecutor {
    async fn execute(
        &self,
        migration: &MigrationDescriptor,
        target: &MigrationTarget,
    ) -> Result<(), ExecutionError> {
        tracing::debug!(
            program = %self.program,
            file = %migration.path.display(),
            "Spawning migration"
        );

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg("--space-id")
            .arg(&target.space_id)
            .arg("--environment-id")
            .arg(target.environment.as_str())
            .arg("--management-token")
            .arg(target.access_token.expose())
            .arg("--yes")
            .arg(&migration.path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExecutionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        Err(ExecutionError::Failed {
            path: migration.path.clone(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor() -> MigrationDescriptor {
        MigrationDescriptor {
            version: "1.1.0".parse().unwrap(),
            path: PathBuf::from("/work/migrations/1_1_0.js"),
        }
    }

    fn target() -> MigrationTarget {
        MigrationTarget {
            space_id: "space1".to_string(),
            environment: EnvironmentId::new("GH-x"),
            access_token: Secret::new("token"),
        }
    }

    #[test]
    fn from_config_splits_command() {
        let mut config = MigrateConfig::new("s", Secret::new("t"), "refs/heads/x", "/w");
        config.migration_command = "npx contentful-migration".to_string();

        let executor = CommandExecutor::from_config(&config);
        assert_eq!(executor.program(), "npx");
        assert_eq!(executor.args, vec!["contentful-migration".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_exit_is_success() {
        let executor = CommandExecutor::new("true");
        executor.execute(&descriptor(), &target()).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_exit_is_failure() {
        let executor = CommandExecutor::new("false");
        let err = executor.execute(&descriptor(), &target()).await.unwrap_err();

        match err {
            ExecutionError::Failed { path, code, .. } => {
                assert_eq!(path, PathBuf::from("/work/migrations/1_1_0.js"));
                assert_eq!(code, Some(1));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let executor = CommandExecutor::new("envmig-definitely-not-installed");
        let err = executor.execute(&descriptor(), &target()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }
}
