//! envmig Core - versioned environment migrations
//!
//! Provisions an isolated environment in a content backend, applies the
//! pending migrations to it in order, and on primary runs points a stable
//! alias at the result:
//! - Discovers and orders migration files
//! - Replaces, creates and polls the target environment
//! - Links existing API keys to the environment
//! - Reads and advances the single version record
//! - Applies migrations with one progress commit per step
//! - Switches the primary alias
//!
//! # Example
//!
//! ```rust,ignore
//! use envmig_core::{CommandExecutor, MigrateConfig, Orchestrator};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     api: Arc<dyn envmig_core::ManagementApi>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = MigrateConfig::from_env()?;
//! let executor = Arc::new(CommandExecutor::from_config(&config));
//! let orchestrator = Orchestrator::new(config, api, executor);
//!
//! let report = orchestrator.run().await?;
//! println!("{} now at {}", report.environment, report.final_version);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod alias;
pub mod backend;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod linker;
pub mod orchestrator;
pub mod poller;
pub mod provisioner;
pub mod runner;
pub mod stage;
pub mod tracker;
pub mod types;

// Re-exports for convenience
pub use alias::{AliasSwitcher, CutoverOutcome};
pub use backend::ManagementApi;
pub use catalog::{MigrationCatalog, MigrationDescriptor, MigrationVersion};
pub use config::{MigrateConfig, NamingConfig, PollingConfig, ReadinessPolicy, Secret};
pub use error::{
    BackendError, CatalogError, CodecError, ConfigError, ExecutionError, ProvisionError, RunError,
    VersionError,
};
pub use executor::{CommandExecutor, MigrationExecutor, MigrationTarget};
pub use linker::{ApiKeyLinker, LinkSummary};
pub use orchestrator::{Orchestrator, RunReport};
pub use poller::{PollOutcome, StatusPoller};
pub use provisioner::{EnvironmentProvisioner, Provisioned, Readiness};
pub use runner::{MigrationRunner, ProgressLog};
pub use stage::{RunStage, StageTracker};
pub use tracker::{VersionRecord, VersionTracker};
pub use types::{
    Alias, ApiKey, Entry, Environment, EnvironmentId, EnvironmentLink, EnvironmentStatus, LinkKind,
    Locale, RunKind, RunTarget, Space,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
