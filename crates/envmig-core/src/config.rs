//! Run configuration
//!
//! Built once from process variables and passed by reference to every
//! component; nothing reads the process environment after construction.

use crate::error::ConfigError;
use crate::types::{branch_of_ref, EnvironmentId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Backend space identifier
pub const SPACE_ID: &str = "SPACE_ID";
/// Source-control ref, e.g. `refs/heads/master`
pub const GITHUB_REF: &str = "GITHUB_REF";
/// Management API credential
pub const MANAGEMENT_API_KEY: &str = "MANAGEMENT_API_KEY";
/// Checkout root containing `migrations/`
pub const GITHUB_WORKSPACE: &str = "GITHUB_WORKSPACE";

const POLL_INTERVAL_MS: &str = "ENVMIG_POLL_INTERVAL_MS";
const MAX_POLL_ATTEMPTS: &str = "ENVMIG_MAX_POLL_ATTEMPTS";
const READINESS_POLICY: &str = "ENVMIG_READINESS_POLICY";
const PRIMARY_BRANCH: &str = "ENVMIG_PRIMARY_BRANCH";
const PRIMARY_ALIAS: &str = "ENVMIG_PRIMARY_ALIAS";
const FEATURE_PREFIX: &str = "ENVMIG_FEATURE_PREFIX";
const VERSION_CONTENT_TYPE: &str = "ENVMIG_VERSION_CONTENT_TYPE";
const VERSION_FIELD: &str = "ENVMIG_VERSION_FIELD";
const SOURCE_ENVIRONMENT: &str = "ENVMIG_SOURCE_ENVIRONMENT";
const MIGRATION_COMMAND: &str = "ENVMIG_MIGRATION_COMMAND";
const API_BASE_URL: &str = "ENVMIG_API_BASE_URL";

/// Default management API endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://api.contentful.com";

/// Credential that never shows up in logs
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a credential
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Reveal the credential for use on the wire
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

/// What to do when the environment never reports a terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessPolicy {
    /// Abort the run
    #[default]
    Fail,
    /// Warn and continue as if ready
    Proceed,
}

impl FromStr for ReadinessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "proceed" => Ok(Self::Proceed),
            other => Err(format!("expected 'fail' or 'proceed', got '{other}'")),
        }
    }
}

/// Environment naming and primary-run classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Branch whose runs are primary
    pub primary_branch: String,
    /// Alias repointed on primary runs; also the one environment never deleted
    pub primary_alias: String,
    /// Prefix for feature-branch environments
    pub feature_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            primary_branch: "master".to_string(),
            primary_alias: "master".to_string(),
            feature_prefix: "GH-".to_string(),
        }
    }
}

/// Readiness polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between status checks
    pub interval: Duration,
    /// Maximum number of status checks
    pub max_attempts: u32,
    /// Behaviour on attempt exhaustion
    pub readiness_policy: ReadinessPolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            max_attempts: 10,
            readiness_policy: ReadinessPolicy::Fail,
        }
    }
}

/// Configuration for one migration run
#[derive(Debug, Clone, Serialize)]
pub struct MigrateConfig {
    /// Backend space
    pub space_id: String,
    /// Management API credential
    pub management_token: Secret,
    /// Source-control ref driving naming
    pub git_ref: String,
    /// Checkout root
    pub workspace_root: PathBuf,
    /// Naming rules
    pub naming: NamingConfig,
    /// Readiness polling
    pub polling: PollingConfig,
    /// Content type of the version record
    pub version_content_type: String,
    /// Field holding the version string
    pub version_field: String,
    /// Environment new environments are cloned from; backend default if unset
    pub source_environment: Option<EnvironmentId>,
    /// Program that applies a single migration file
    pub migration_command: String,
    /// Management API endpoint
    pub api_base_url: String,
}

impl MigrateConfig {
    /// Create configuration with defaults for everything optional
    #[must_use]
    pub fn new(
        space_id: impl Into<String>,
        management_token: Secret,
        git_ref: impl Into<String>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        let naming = NamingConfig::default();
        Self {
            space_id: space_id.into(),
            management_token,
            git_ref: git_ref.into(),
            workspace_root: workspace_root.into(),
            source_environment: Some(EnvironmentId::new(naming.primary_alias.clone())),
            naming,
            polling: PollingConfig::default(),
            version_content_type: "versionTracking".to_string(),
            version_field: "version".to_string(),
            migration_command: "contentful-migration".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Load from the process environment
    ///
    /// # Errors
    /// `ConfigError` if a required variable is missing or any value is malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup
    ///
    /// # Errors
    /// `ConfigError` if a required variable is missing or any value is malformed
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let git_ref = required(GITHUB_REF)?;
        if branch_of_ref(&git_ref).is_empty() {
            return Err(ConfigError::invalid(GITHUB_REF, git_ref, "ref has no branch segment"));
        }

        let mut config = Self::new(
            required(SPACE_ID)?,
            Secret::new(required(MANAGEMENT_API_KEY)?),
            git_ref,
            required(GITHUB_WORKSPACE)?,
        );

        if let Some(ms) = get(POLL_INTERVAL_MS) {
            let parsed = ms
                .parse::<u64>()
                .map_err(|e| ConfigError::invalid(POLL_INTERVAL_MS, &ms, e.to_string()))?;
            config.polling.interval = Duration::from_millis(parsed);
        }
        if let Some(attempts) = get(MAX_POLL_ATTEMPTS) {
            let parsed = attempts
                .parse::<u32>()
                .map_err(|e| ConfigError::invalid(MAX_POLL_ATTEMPTS, &attempts, e.to_string()))?;
            config = config.with_max_poll_attempts(parsed)?;
        }
        if let Some(policy) = get(READINESS_POLICY) {
            config.polling.readiness_policy = policy
                .parse::<ReadinessPolicy>()
                .map_err(|reason: String| ConfigError::invalid(READINESS_POLICY, &policy, reason))?;
        }
        if let Some(branch) = get(PRIMARY_BRANCH) {
            config.naming.primary_branch = branch;
        }
        if let Some(alias) = get(PRIMARY_ALIAS) {
            config.source_environment = Some(EnvironmentId::new(alias.clone()));
            config.naming.primary_alias = alias;
        }
        if let Some(prefix) = get(FEATURE_PREFIX) {
            config.naming.feature_prefix = prefix;
        }
        if let Some(content_type) = get(VERSION_CONTENT_TYPE) {
            config.version_content_type = content_type;
        }
        if let Some(field) = get(VERSION_FIELD) {
            config.version_field = field;
        }
        if let Some(source) = get(SOURCE_ENVIRONMENT) {
            config.source_environment = Some(EnvironmentId::new(source));
        }
        if let Some(command) = get(MIGRATION_COMMAND) {
            config.migration_command = command;
        }
        if let Some(url) = get(API_BASE_URL) {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }

        Ok(config)
    }

    /// With poll interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.polling.interval = interval;
        self
    }

    /// With maximum poll attempts
    ///
    /// # Errors
    /// `ConfigError::Invalid` for zero attempts
    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Result<Self, ConfigError> {
        if attempts == 0 {
            return Err(ConfigError::invalid(
                MAX_POLL_ATTEMPTS,
                "0",
                "at least one attempt is required",
            ));
        }
        self.polling.max_attempts = attempts;
        Ok(self)
    }

    /// With readiness policy
    #[inline]
    #[must_use]
    pub fn with_readiness_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.polling.readiness_policy = policy;
        self
    }

    /// With source environment for clones
    #[inline]
    #[must_use]
    pub fn with_source_environment(mut self, source: Option<EnvironmentId>) -> Self {
        self.source_environment = source;
        self
    }

    /// Branch name (last segment of the ref)
    #[inline]
    #[must_use]
    pub fn branch(&self) -> &str {
        branch_of_ref(&self.git_ref)
    }

    /// Directory holding migration files
    #[inline]
    #[must_use]
    pub fn migrations_dir(&self) -> PathBuf {
        self.workspace_root.join("migrations")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            (SPACE_ID, "space1"),
            (GITHUB_REF, "refs/heads/feature-x"),
            (MANAGEMENT_API_KEY, "CFPAT-secret"),
            (GITHUB_WORKSPACE, "/work"),
        ]
    }

    fn load(pairs: &[(&str, &str)]) -> Result<MigrateConfig, ConfigError> {
        let map = vars(pairs);
        MigrateConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn loads_required_and_defaults() {
        let config = load(&required()).unwrap();

        assert_eq!(config.space_id, "space1");
        assert_eq!(config.branch(), "feature-x");
        assert_eq!(config.migrations_dir(), PathBuf::from("/work/migrations"));
        assert_eq!(config.polling, PollingConfig::default());
        assert_eq!(config.source_environment, Some(EnvironmentId::new("master")));
        assert_eq!(config.version_content_type, "versionTracking");
    }

    #[test]
    fn missing_variable_is_reported_by_name() {
        for skip in [SPACE_ID, GITHUB_REF, MANAGEMENT_API_KEY, GITHUB_WORKSPACE] {
            let pairs: Vec<_> = required().into_iter().filter(|(k, _)| *k != skip).collect();
            match load(&pairs) {
                Err(ConfigError::Missing(key)) => assert_eq!(key, skip),
                other => panic!("expected Missing({skip}), got {other:?}"),
            }
        }
    }

    #[test]
    fn blank_variable_counts_as_missing() {
        let mut pairs = required();
        pairs[0] = (SPACE_ID, "  ");
        assert!(matches!(load(&pairs), Err(ConfigError::Missing(SPACE_ID))));
    }

    #[test]
    fn ref_without_branch_is_invalid() {
        let mut pairs = required();
        pairs[1] = (GITHUB_REF, "refs/heads/");
        assert!(matches!(load(&pairs), Err(ConfigError::Invalid { key: GITHUB_REF, .. })));
    }

    #[test]
    fn tuning_overrides() {
        let mut pairs = required();
        pairs.extend([
            (POLL_INTERVAL_MS, "250"),
            (MAX_POLL_ATTEMPTS, "4"),
            (READINESS_POLICY, "Proceed"),
            (PRIMARY_ALIAS, "main"),
            (API_BASE_URL, "http://localhost:8080/"),
        ]);
        let config = load(&pairs).unwrap();

        assert_eq!(config.polling.interval, Duration::from_millis(250));
        assert_eq!(config.polling.max_attempts, 4);
        assert_eq!(config.polling.readiness_policy, ReadinessPolicy::Proceed);
        assert_eq!(config.naming.primary_alias, "main");
        assert_eq!(config.source_environment, Some(EnvironmentId::new("main")));
        assert_eq!(config.api_base_url, "http://localhost:8080");
    }

    #[test]
    fn malformed_tuning_values_are_rejected() {
        let mut pairs = required();
        pairs.push((MAX_POLL_ATTEMPTS, "0"));
        assert!(matches!(load(&pairs), Err(ConfigError::Invalid { key: MAX_POLL_ATTEMPTS, .. })));

        let mut pairs = required();
        pairs.push((READINESS_POLICY, "maybe"));
        assert!(matches!(load(&pairs), Err(ConfigError::Invalid { key: READINESS_POLICY, .. })));

        let mut pairs = required();
        pairs.push((POLL_INTERVAL_MS, "soon"));
        assert!(matches!(load(&pairs), Err(ConfigError::Invalid { key: POLL_INTERVAL_MS, .. })));
    }

    #[test]
    fn token_is_redacted() {
        let config = load(&required()).unwrap();
        let debug = format!("{config:?}");
        let json = serde_json::to_string(&config).unwrap();

        assert!(!debug.contains("CFPAT-secret"));
        assert!(!json.contains("CFPAT-secret"));
        assert_eq!(config.management_token.expose(), "CFPAT-secret");
    }
}
