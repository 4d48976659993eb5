//! Ordered migration execution
//!
//! Pending migrations are the catalog entries strictly after the stored
//! version. They run one at a time; each success is committed to the
//! progress log before the next starts, and the first failure stops the run.
//! The stored version therefore always names the last migration that
//! actually completed.

use crate::catalog::{MigrationCatalog, MigrationDescriptor, MigrationVersion};
use crate::error::{RunError, VersionError};
use crate::executor::{MigrationExecutor, MigrationTarget};
use async_trait::async_trait;

/// Durable record of applied migrations
#[async_trait]
pub trait ProgressLog: Send {
    /// Record `version` as the last applied migration
    async fn commit(&mut self, version: &MigrationVersion) -> Result<(), VersionError>;
}

/// Migrations after `current`, in order
///
/// # Errors
/// `RunError::UnknownStoredVersion` if `current` is not in the catalog
pub fn pending<'c>(
    catalog: &'c MigrationCatalog,
    current: &str,
) -> Result<&'c [MigrationDescriptor], RunError> {
    let unknown = || RunError::UnknownStoredVersion {
        version: current.to_string(),
    };
    let version = current.parse::<MigrationVersion>().map_err(|_| unknown())?;
    let index = catalog.position(&version).ok_or_else(unknown)?;
    Ok(&catalog.migrations()[index + 1..])
}

/// Runs pending migrations against one target
pub struct MigrationRunner<'a> {
    executor: &'a dyn MigrationExecutor,
    target: &'a MigrationTarget,
}

impl<'a> MigrationRunner<'a> {
    /// Create runner
    #[inline]
    #[must_use]
    pub fn new(executor: &'a dyn MigrationExecutor, target: &'a MigrationTarget) -> Self {
        Self { executor, target }
    }

    /// Apply `pending` in order, committing each success to `progress`
    ///
    /// Returns the versions applied.
    ///
    /// # Errors
    /// - `RunError::MigrationFailed` when a migration fails; nothing after it runs
    /// - `RunError::ProgressNotRecorded` when a migration applied but its commit failed
    pub async fn run<'p, I, P>(
        &self,
        pending: I,
        progress: &mut P,
    ) -> Result<Vec<MigrationVersion>, RunError>
    where
        I: IntoIterator<Item = &'p MigrationDescriptor>,
        P: ProgressLog + ?Sized,
    {
        let mut applied = Vec::new();

        for migration in pending {
            tracing::info!("Running {}", migration.path.display());

            if let Err(source) = self.executor.execute(migration, self.target).await {
                tracing::error!("{} failed: {}", migration.version, source);
                return Err(RunError::MigrationFailed {
                    version: migration.version.to_string(),
                    source,
                });
            }
            tracing::info!("{} succeeded", migration.version);

            progress
                .commit(&migration.version)
                .await
                .map_err(|source| RunError::ProgressNotRecorded {
                    version: migration.version.to_string(),
                    source,
                })?;
            applied.push(migration.version.clone());
        }

        Ok(applied)
    }
}
