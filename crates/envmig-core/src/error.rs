//! Error types for envmig
//!
//! One enum per concern; all but configuration fold into [`RunError`] at
//! the orchestrator:
//! - Configuration loading
//! - Migration file naming and discovery
//! - Backend (management API) calls
//! - Migration execution
//! - Environment provisioning
//! - Version record access

use crate::stage::RunStage;
use crate::types::EnvironmentStatus;
use std::path::PathBuf;

/// Top-level error of a migration run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Backend call outside of a more specific stage failed
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Migration directory could not be read
    #[error("migration catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Target environment could not be provisioned
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    /// API keys could not be linked to the new environment
    #[error("linking api keys failed: {source}")]
    ApiKeyLinking {
        /// The failed update
        #[source]
        source: BackendError,
    },

    /// Version record could not be read
    #[error("version check failed: {0}")]
    Version(#[from] VersionError),

    /// Stored version does not match any known migration
    #[error("version {version} is not matching with any known migration")]
    UnknownStoredVersion {
        /// The stored version string
        version: String,
    },

    /// A migration failed to apply; later migrations were not attempted
    #[error("migration {version} failed: {source}")]
    MigrationFailed {
        /// Version of the failed migration
        version: String,
        /// Executor failure
        #[source]
        source: ExecutionError,
    },

    /// A migration applied but the version record was not advanced
    #[error("migration {version} applied but progress was not recorded: {source}")]
    ProgressNotRecorded {
        /// Version of the applied migration
        version: String,
        /// Tracker failure
        #[source]
        source: VersionError,
    },

    /// Orchestrator attempted an undefined stage transition
    #[error("illegal stage transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current stage
        from: RunStage,
        /// Requested stage
        to: RunStage,
    },
}

impl RunError {
    /// Stage in which this error is raised
    #[must_use]
    pub fn stage(&self) -> RunStage {
        match self {
            Self::Catalog(_) | Self::Backend(_) => RunStage::Init,
            Self::Provision(_) => RunStage::Provisioning,
            Self::ApiKeyLinking { .. } => RunStage::Linking,
            Self::Version(_) | Self::UnknownStoredVersion { .. } => RunStage::VersionCheck,
            Self::MigrationFailed { .. } | Self::ProgressNotRecorded { .. } => {
                RunStage::Migrating
            }
            Self::IllegalTransition { from, .. } => *from,
        }
    }

    /// Whether the error was raised before any migration could run
    #[inline]
    #[must_use]
    pub fn before_migrations(&self) -> bool {
        self.stage() < RunStage::Migrating
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required variable is absent or empty
    #[error("required variable {0} is not set")]
    Missing(&'static str),

    /// Variable is present but unusable
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        key: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Version/file-name conversion errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Not a dotted sequence of digit groups
    #[error("invalid version '{0}': expected digit groups separated by dots")]
    InvalidVersion(String),

    /// Not a `<digits>(_<digits>)*.js` file name
    #[error("invalid migration file name '{0}'")]
    InvalidFileName(String),
}

/// Migration discovery errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Directory could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        /// Directory or file involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File name did not decode
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Two files decode to the same numeric version
    #[error("duplicate migration version {version}: {first} and {second}")]
    Duplicate {
        /// Shared version
        version: String,
        /// First file name
        first: String,
        /// Second file name
        second: String,
    },
}

/// Management API errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Resource does not exist
    #[error("{resource} not found")]
    NotFound {
        /// Human readable resource description
        resource: String,
    },

    /// Non-success response
    #[error("backend returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Error message from the response body
        message: String,
    },

    /// Request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not have the expected shape
    #[error("malformed response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Create not-found error
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Check if the resource was missing
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Migration execution errors
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Executor process could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Migration ran and reported failure
    #[error("{path} exited with {code:?}: {stderr}")]
    Failed {
        /// Migration file
        path: PathBuf,
        /// Exit code, if any
        code: Option<i32>,
        /// Captured error output
        stderr: String,
    },
}

/// Environment provisioning errors
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Backend call failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Backend reported the environment as failed
    #[error("environment {environment} failed to provision")]
    CreationFailed {
        /// Environment id
        environment: String,
    },

    /// Environment never reached a terminal status
    #[error("environment {environment} not ready after {attempts} attempts (last status: {last})")]
    ReadinessTimeout {
        /// Environment id
        environment: String,
        /// Attempts made
        attempts: u32,
        /// Last observed status
        last: EnvironmentStatus,
    },

    /// Protected environment is reused but does not exist
    #[error("protected environment {environment} does not exist")]
    ProtectedMissing {
        /// Environment id
        environment: String,
    },
}

/// Version record errors
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    /// Backend call failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Not exactly one version record exists
    #[error("there should only be one entry of type '{content_type}', found {found}")]
    InvariantViolation {
        /// Version content type id
        content_type: String,
        /// Number of entries found
        found: usize,
    },

    /// Environment has no default locale
    #[error("environment {environment} has no default locale")]
    NoDefaultLocale {
        /// Environment id
        environment: String,
    },

    /// Record has no value under the default locale
    #[error("entry {entry} has no '{field}' value for locale {locale}")]
    MissingValue {
        /// Entry id
        entry: String,
        /// Field id
        field: String,
        /// Locale code
        locale: String,
    },
}
