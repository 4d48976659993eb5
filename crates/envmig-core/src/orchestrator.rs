//! Migration run orchestrator
//!
//! Sequences one run:
//! 1. Discover migrations and verify the space
//! 2. Provision the target environment
//! 3. Link API keys to it
//! 4. Read the version record and compute pending migrations
//! 5. Apply them in order
//! 6. On primary runs, switch the alias (failure is logged, not fatal)

use crate::alias::{AliasSwitcher, CutoverOutcome};
use crate::backend::ManagementApi;
use crate::catalog::{MigrationCatalog, MigrationVersion};
use crate::config::MigrateConfig;
use crate::error::RunError;
use crate::executor::{MigrationExecutor, MigrationTarget};
use crate::linker::{ApiKeyLinker, LinkSummary};
use crate::poller::StatusPoller;
use crate::provisioner::{EnvironmentProvisioner, Provisioned, Readiness};
use crate::runner::{self, MigrationRunner};
use crate::stage::{RunStage, StageTracker};
use crate::tracker::VersionTracker;
use crate::types::{EnvironmentId, RunKind, RunTarget};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Branch driving the run
    pub branch: String,
    /// Run classification
    pub kind: RunKind,
    /// Environment migrated
    pub environment: EnvironmentId,
    /// How readiness was established
    pub readiness: Readiness,
    /// Keys linked to the environment
    pub linked_keys: LinkSummary,
    /// Version stored before the run
    pub starting_version: String,
    /// Versions applied, in order
    pub applied: Vec<MigrationVersion>,
    /// Version stored after the run
    pub final_version: String,
    /// Alias cutover result
    pub cutover: CutoverOutcome,
    /// Stages visited
    pub stages: Vec<RunStage>,
}

/// Runs the full pipeline against injected collaborators
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<MigrateConfig>,
    api: Arc<dyn ManagementApi>,
    executor: Arc<dyn MigrationExecutor>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create orchestrator
    #[must_use]
    pub fn new(
        config: impl Into<Arc<MigrateConfig>>,
        api: Arc<dyn ManagementApi>,
        executor: Arc<dyn MigrationExecutor>,
    ) -> Self {
        Self {
            config: config.into(),
            api,
            executor,
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// Target of a run started now
    #[must_use]
    pub fn target(&self) -> RunTarget {
        self.target_at(Utc::now())
    }

    /// Target of a run started at `now`
    #[must_use]
    pub fn target_at(&self, now: DateTime<Utc>) -> RunTarget {
        RunTarget::resolve(&self.config.naming, self.config.branch(), now)
    }

    /// Execute a run now
    ///
    /// # Errors
    /// The first fatal error; see [`RunError`]
    pub async fn run(&self) -> Result<RunReport, RunError> {
        self.run_at(Utc::now()).await
    }

    /// Execute a run as if started at `now`
    ///
    /// # Errors
    /// The first fatal error; see [`RunError`]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunReport, RunError> {
        let target = self.target_at(now);
        let mut stages = StageTracker::new();
        let span = tracing::info_span!(
            "run",
            environment = %target.environment,
            kind = ?target.kind
        );

        match self.execute(&target, &mut stages).instrument(span).await {
            Ok(report) => {
                tracing::info!("All done!");
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Run failed during {:?}: {}", e.stage(), e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        target: &RunTarget,
        stages: &mut StageTracker,
    ) -> Result<RunReport, RunError> {
        let api = self.api.as_ref();

        match target.kind {
            RunKind::Primary => tracing::info!("Running on {}.", target.branch),
            RunKind::Feature => tracing::info!("Running on feature branch"),
        }
        tracing::info!("ENVIRONMENT_ID: {}", target.environment);

        let catalog = self.discover().await?;
        let space = api.space().await?;
        tracing::info!("Using space {} ({})", space.name, space.id);

        stages.advance(RunStage::Provisioning)?;
        let provisioned = self.provision(&target.environment).await?;

        stages.advance(RunStage::Linking)?;
        tracing::info!("Update API Keys to allow access to new environment");
        let linked_keys = ApiKeyLinker::new(api)
            .link_all(&provisioned.environment)
            .await
            .map_err(|source| RunError::ApiKeyLinking { source })?;

        stages.advance(RunStage::VersionCheck)?;
        tracing::info!("Figure out latest ran migration of the contentful space");
        let mut tracker = VersionTracker::read(
            api,
            provisioned.environment.clone(),
            &self.config.version_content_type,
            &self.config.version_field,
        )
        .await?;
        let starting_version = tracker.current_version()?.to_string();

        tracing::info!("Evaluate which migrations to run");
        let pending = runner::pending(&catalog, &starting_version)?;
        tracing::info!(
            "Stored version {}, {} pending migration(s)",
            starting_version,
            pending.len()
        );

        stages.advance(RunStage::Migrating)?;
        tracing::info!("Run migrations and update version entry");
        let migration_target = MigrationTarget::new(&self.config, provisioned.environment.clone());
        let applied = MigrationRunner::new(self.executor.as_ref(), &migration_target)
            .run(pending, &mut tracker)
            .await?;
        let final_version = tracker.current_version()?.to_string();

        let cutover = if target.kind.is_primary() {
            stages.advance(RunStage::CuttingOver)?;
            tracing::info!("Updating {} alias.", self.config.naming.primary_alias);
            AliasSwitcher::new(api)
                .cut_over(&self.config.naming.primary_alias, &provisioned.environment)
                .await
        } else {
            tracing::info!("No alias changes required");
            CutoverOutcome::Skipped
        };

        stages.advance(RunStage::Done)?;

        Ok(RunReport {
            branch: target.branch.clone(),
            kind: target.kind,
            environment: provisioned.environment,
            readiness: provisioned.readiness,
            linked_keys,
            starting_version,
            applied,
            final_version,
            cutover,
            stages: stages.history().to_vec(),
        })
    }

    async fn discover(&self) -> Result<MigrationCatalog, RunError> {
        let dir = self.config.migrations_dir();
        tracing::info!("Read all the available migrations from {}", dir.display());
        Ok(MigrationCatalog::discover(&dir).await?)
    }

    #[tracing::instrument(skip(self), fields(stage = "provisioning"))]
    async fn provision(&self, environment: &EnvironmentId) -> Result<Provisioned, RunError> {
        let provisioner = EnvironmentProvisioner::new(
            self.api.as_ref(),
            StatusPoller::from_config(&self.config.polling),
            self.config.polling.readiness_policy,
            &self.config.naming.primary_alias,
        )
        .with_source(self.config.source_environment.as_ref());

        Ok(provisioner.provision(environment).await?)
    }
}
